//! Fixtures shared by the layer tests.

use std::sync::Arc;

use streaming::{
    BoxFuture, DataType, InMemorySource, PixelSource, PyramidLevel, Raster, RasterRequest,
    Selection, SourceError, TileRequest,
};
use tokio::sync::Semaphore;

use crate::grid::GridCell;

/// Two-channel square cell whose pixels all hold `fill`.
pub(crate) fn cell_source(size: u32, fill: u16) -> InMemorySource {
    let n = (size * size) as usize;
    InMemorySource::builder(["c", "y", "x"], size, size)
        .plane(Selection::new([0]), vec![fill; n])
        .plane(Selection::new([1]), vec![fill + 1; n])
        .build()
}

/// `rows` x `cols` cells, each a pyramid of `levels` levels.
pub(crate) fn plate(rows: u32, cols: u32, size: u32, levels: usize) -> Vec<GridCell> {
    let mut cells = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let fill = (row * cols + col) as u16;
            cells.push(GridCell::new(
                row,
                col,
                well_name(row, col),
                cell_source(size, fill).into_pyramid(levels),
            ));
        }
    }
    cells
}

/// Single-level plate that keeps handles to its sources, row-major.
pub(crate) fn tracked_plate(
    rows: u32,
    cols: u32,
    size: u32,
) -> (Vec<GridCell>, Vec<Arc<InMemorySource>>) {
    let mut cells = Vec::new();
    let mut sources = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let source = Arc::new(cell_source(size, (row * cols + col) as u16));
            cells.push(GridCell::new(
                row,
                col,
                well_name(row, col),
                vec![Arc::clone(&source) as PyramidLevel],
            ));
            sources.push(source);
        }
    }
    (cells, sources)
}

fn well_name(row: u32, col: u32) -> String {
    format!("{}{}", char::from(b'A' + row as u8), col + 1)
}

/// Wraps a source so each raster fetch waits for a permit on `gate`.
pub(crate) struct GatedSource {
    inner: InMemorySource,
    gate: Arc<Semaphore>,
}

impl GatedSource {
    pub(crate) fn new(inner: InMemorySource) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                inner,
                gate: Arc::clone(&gate),
            },
            gate,
        )
    }
}

impl PixelSource for GatedSource {
    fn shape(&self) -> &[usize] {
        self.inner.shape()
    }

    fn labels(&self) -> &[String] {
        self.inner.labels()
    }

    fn tile_size(&self) -> u32 {
        self.inner.tile_size()
    }

    fn dtype(&self) -> DataType {
        self.inner.dtype()
    }

    fn get_raster(&self, request: RasterRequest) -> BoxFuture<'_, Result<Raster, SourceError>> {
        Box::pin(async move {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| SourceError::aborted())?;
            self.inner.get_raster(request).await
        })
    }

    fn get_tile(&self, request: TileRequest) -> BoxFuture<'_, Result<Raster, SourceError>> {
        Box::pin(async move {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| SourceError::aborted())?;
            self.inner.get_tile(request).await
        })
    }
}

/// Source whose fetches always fail with a transient error.
pub(crate) struct FailingSource {
    inner: InMemorySource,
}

impl FailingSource {
    pub(crate) fn new(size: u32) -> Self {
        Self {
            inner: cell_source(size, 0),
        }
    }
}

impl PixelSource for FailingSource {
    fn shape(&self) -> &[usize] {
        self.inner.shape()
    }

    fn labels(&self) -> &[String] {
        self.inner.labels()
    }

    fn tile_size(&self) -> u32 {
        self.inner.tile_size()
    }

    fn dtype(&self) -> DataType {
        self.inner.dtype()
    }

    fn get_raster(&self, _request: RasterRequest) -> BoxFuture<'_, Result<Raster, SourceError>> {
        Box::pin(async { Err(SourceError::transient("connection reset")) })
    }

    fn get_tile(&self, _request: TileRequest) -> BoxFuture<'_, Result<Raster, SourceError>> {
        Box::pin(async { Err(SourceError::transient("connection reset")) })
    }
}

/// Label image whose pixel at (x, y) holds `y * width + x`, tiled by `tile_size`.
pub(crate) fn label_source(width: u32, height: u32, tile_size: u32) -> InMemorySource {
    let data: Vec<u32> = (0..width * height).collect();
    InMemorySource::builder(["y", "x"], width, height)
        .tile_size(tile_size)
        .plane(Selection::default(), data)
        .build()
}

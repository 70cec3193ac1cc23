//! Planning and running the raster fetches for one grid refresh.
//!
//! Planning is synchronous and borrows the layer's props; the resulting
//! [`FetchPlan`] owns everything it needs, so its future can outlive the
//! borrow and be driven by whatever executor the host uses.

use std::sync::Arc;

use foundation::Bounds;
use futures_util::future::try_join_all;
use streaming::{
    BoxFuture, Dimensions, PixelWindow, PyramidLevel, RasterRequest, Selection, dimensions,
    map_bounded,
};

use crate::error::LayerError;
use crate::grid::cell::{GridCell, RenderTile};
use crate::grid::geometry::{cell_bounds, pixel_window};

/// Inputs for one refresh.
#[derive(Debug, Clone, Copy)]
pub struct GridFetchRequest<'a> {
    pub cells: &'a [GridCell],
    pub selections: &'a Arc<[Selection]>,
    pub level: usize,
    pub full: Dimensions,
    pub spacer: f64,
    /// Total concurrent raster fetches, shared across selections.
    pub concurrency: usize,
    /// Visible region in grid space; `None` fetches every cell whole.
    pub visible: Option<Bounds>,
}

#[derive(Debug, Clone)]
struct CellFetch {
    row: u32,
    col: u32,
    name: String,
    level: usize,
    source: PyramidLevel,
    window: Option<PixelWindow>,
    bounds: Bounds,
}

/// Owned list of per-cell fetches, ready to execute.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    cells: Vec<CellFetch>,
    selections: Arc<[Selection]>,
    concurrency: usize,
}

/// Cells fetched at once, so that cells x selections stays near `limit`.
pub fn cell_concurrency(limit: usize, selections: usize) -> usize {
    limit.div_ceil(selections.max(1)).max(1)
}

impl FetchPlan {
    pub fn plan(request: &GridFetchRequest<'_>) -> Result<Self, LayerError> {
        let mut cells = Vec::new();
        for cell in request.cells {
            let Some(visible) = request.visible else {
                if let Some(fetch) = whole_cell(cell, request)? {
                    cells.push(fetch);
                }
                continue;
            };
            let bounds = cell_bounds(cell.row, cell.col, request.full, request.spacer);
            let Some(overlap) = bounds.intersect(&visible) else {
                continue;
            };
            let (level, source) = pick_source(cell, request.level)?;
            let level_size = dimensions(source.as_ref())?;
            let window = pixel_window(&bounds, &overlap, request.full, level_size);
            cells.push(CellFetch {
                row: cell.row,
                col: cell.col,
                name: cell.name.clone(),
                level,
                source,
                window: window.window,
                bounds: window.bounds,
            });
        }
        Ok(Self {
            cells,
            selections: Arc::clone(request.selections),
            concurrency: cell_concurrency(request.concurrency, request.selections.len()),
        })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells this plan will fetch, as `(row, col, window)`.
    pub fn targets(&self) -> impl Iterator<Item = (u32, u32, Option<PixelWindow>)> + '_ {
        self.cells.iter().map(|c| (c.row, c.col, c.window))
    }

    pub fn execute(self) -> BoxFuture<'static, Result<Vec<RenderTile>, LayerError>> {
        let FetchPlan {
            cells,
            selections,
            concurrency,
        } = self;
        Box::pin(async move {
            let tiles = map_bounded(cells, concurrency, |cell| {
                fetch_cell(cell, Arc::clone(&selections))
            })
            .await?;
            validate_tile_shapes(&tiles)?;
            Ok(tiles)
        })
    }
}

/// Plans and runs a refresh in one step.
pub async fn fetch_grid(request: GridFetchRequest<'_>) -> Result<Vec<RenderTile>, LayerError> {
    FetchPlan::plan(&request)?.execute().await
}

fn whole_cell(
    cell: &GridCell,
    request: &GridFetchRequest<'_>,
) -> Result<Option<CellFetch>, LayerError> {
    if cell.levels.is_empty() {
        return Ok(None);
    }
    let (level, source) = pick_source(cell, request.level)?;
    Ok(Some(CellFetch {
        row: cell.row,
        col: cell.col,
        name: cell.name.clone(),
        level,
        source,
        window: None,
        bounds: cell_bounds(cell.row, cell.col, request.full, request.spacer),
    }))
}

/// Level `min(level, count - 1)` of the cell's pyramid.
fn pick_source(cell: &GridCell, level: usize) -> Result<(usize, PyramidLevel), LayerError> {
    let last = cell
        .levels
        .len()
        .checked_sub(1)
        .ok_or(LayerError::MissingSources {
            row: cell.row,
            col: cell.col,
        })?;
    let index = level.min(last);
    Ok((index, Arc::clone(&cell.levels[index])))
}

async fn fetch_cell(cell: CellFetch, selections: Arc<[Selection]>) -> Result<RenderTile, LayerError> {
    let rasters = try_join_all(selections.iter().map(|selection| {
        cell.source.get_raster(RasterRequest {
            selection: selection.clone(),
            window: cell.window,
        })
    }))
    .await?;

    let (width, height) = rasters
        .first()
        .map(|r| (r.width, r.height))
        .unwrap_or_default();
    Ok(RenderTile {
        row: cell.row,
        col: cell.col,
        name: cell.name,
        level: cell.level,
        dtype: rasters.first().map(|r| r.data.dtype()),
        channels: rasters.into_iter().map(|r| r.data).collect(),
        width,
        height,
        bounds: cell.bounds,
        full_cell: cell.window.is_none(),
    })
}

/// Whole-cell tiles must all share one size; windowed tiles are exempt.
pub fn validate_tile_shapes(tiles: &[RenderTile]) -> Result<(), LayerError> {
    let mut full = tiles.iter().filter(|t| t.full_cell);
    let Some(first) = full.next() else {
        return Ok(());
    };
    let expected = Dimensions::new(first.width, first.height);
    match full.find(|t| t.width != expected.width || t.height != expected.height) {
        Some(t) => Err(LayerError::ShapeMismatch {
            row: t.row,
            col: t.col,
            expected,
            found: Dimensions::new(t.width, t.height),
        }),
        None => Ok(()),
    }
}

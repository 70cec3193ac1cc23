use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::{PixelBuffer, Raster};
use crate::dtype::DataType;
use crate::source::{
    BoxFuture, PixelSource, PixelWindow, PyramidLevel, RasterRequest, Selection, SourceError,
    TileRequest,
};

/// Pixel source backed by fully decoded planes held in memory.
///
/// Used by tests and the demo tool in place of a chunked store. Every raster
/// request is recorded so callers can assert on what was fetched.
#[derive(Debug)]
pub struct InMemorySource {
    shape: Vec<usize>,
    labels: Vec<String>,
    tile_size: u32,
    dtype: DataType,
    width: u32,
    height: u32,
    planes: BTreeMap<Vec<usize>, PixelBuffer>,
    requests: Mutex<Vec<RasterRequest>>,
}

#[derive(Debug)]
pub struct InMemorySourceBuilder {
    labels: Vec<String>,
    width: u32,
    height: u32,
    tile_size: u32,
    dtype: DataType,
    planes: BTreeMap<Vec<usize>, PixelBuffer>,
}

impl InMemorySourceBuilder {
    pub fn tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Adds one plane. The buffer dtype becomes the source dtype.
    pub fn plane(mut self, selection: Selection, data: impl Into<PixelBuffer>) -> Self {
        let data = data.into();
        self.dtype = data.dtype();
        self.planes.insert(selection.0, data);
        self
    }

    pub fn build(self) -> InMemorySource {
        let non_spatial = self
            .labels
            .iter()
            .filter(|l| l.as_str() != "x" && l.as_str() != "y")
            .count();
        let mut extents = vec![1usize; non_spatial];
        for key in self.planes.keys() {
            for (axis, idx) in key.iter().enumerate() {
                if let Some(e) = extents.get_mut(axis) {
                    *e = (*e).max(idx + 1);
                }
            }
        }

        let mut extents = extents.into_iter();
        let shape = self
            .labels
            .iter()
            .map(|l| match l.as_str() {
                "x" => self.width as usize,
                "y" => self.height as usize,
                _ => extents.next().unwrap_or(1),
            })
            .collect();

        InMemorySource {
            shape,
            labels: self.labels,
            tile_size: self.tile_size,
            dtype: self.dtype,
            width: self.width,
            height: self.height,
            planes: self.planes,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl InMemorySource {
    pub fn builder<I, S>(labels: I, width: u32, height: u32) -> InMemorySourceBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        InMemorySourceBuilder {
            labels: labels.into_iter().map(Into::into).collect(),
            width,
            height,
            tile_size: 512,
            dtype: DataType::Uint16,
            planes: BTreeMap::new(),
        }
    }

    /// Raster requests seen so far, in call order.
    pub fn requests(&self) -> Vec<RasterRequest> {
        self.requests.lock().clone()
    }

    /// Half-resolution copy of every plane.
    pub fn downsampled(&self) -> InMemorySource {
        let mut out_w = self.width;
        let mut out_h = self.height;
        let mut planes = BTreeMap::new();
        for (key, plane) in &self.planes {
            let (buf, w, h) = plane.downsample2(self.width, self.height);
            out_w = w;
            out_h = h;
            planes.insert(key.clone(), buf);
        }
        if self.planes.is_empty() {
            out_w = self.width.div_ceil(2).max(1);
            out_h = self.height.div_ceil(2).max(1);
        }
        let shape = self
            .labels
            .iter()
            .zip(self.shape.iter())
            .map(|(l, &n)| match l.as_str() {
                "x" => out_w as usize,
                "y" => out_h as usize,
                _ => n,
            })
            .collect();
        InMemorySource {
            shape,
            labels: self.labels.clone(),
            tile_size: self.tile_size,
            dtype: self.dtype,
            width: out_w,
            height: out_h,
            planes,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Builds `levels` pyramid levels, finest first.
    pub fn into_pyramid(self, levels: usize) -> Vec<PyramidLevel> {
        let mut out: Vec<Arc<InMemorySource>> = vec![Arc::new(self)];
        while out.len() < levels.max(1) {
            let next = out[out.len() - 1].downsampled();
            out.push(Arc::new(next));
        }
        out.into_iter().map(|s| s as PyramidLevel).collect()
    }

    fn plane(&self, selection: &Selection) -> Result<&PixelBuffer, SourceError> {
        self.planes.get(&selection.0).ok_or_else(|| {
            SourceError::precondition(format!("no plane for selection {:?}", selection.0))
        })
    }

    fn check_window(&self, window: &PixelWindow) -> Result<(), SourceError> {
        let fits = window.x[0] < window.x[1]
            && window.y[0] < window.y[1]
            && window.x[1] <= self.width
            && window.y[1] <= self.height;
        if fits {
            Ok(())
        } else {
            Err(SourceError::precondition(format!(
                "window {window:?} outside {}x{} plane",
                self.width, self.height
            )))
        }
    }

    fn read(&self, request: &RasterRequest) -> Result<Raster, SourceError> {
        let plane = self.plane(&request.selection)?;
        match &request.window {
            None => Ok(Raster {
                data: plane.clone(),
                width: self.width,
                height: self.height,
            }),
            Some(window) => {
                self.check_window(window)?;
                Ok(Raster {
                    data: plane.crop(self.width, window),
                    width: window.width(),
                    height: window.height(),
                })
            }
        }
    }
}

impl PixelSource for InMemorySource {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn dtype(&self) -> DataType {
        self.dtype
    }

    fn get_raster(&self, request: RasterRequest) -> BoxFuture<'_, Result<Raster, SourceError>> {
        debug!(selection = ?request.selection.0, window = ?request.window, "in-memory raster request");
        self.requests.lock().push(request.clone());
        Box::pin(async move { self.read(&request) })
    }

    fn get_tile(&self, request: TileRequest) -> BoxFuture<'_, Result<Raster, SourceError>> {
        Box::pin(async move {
            if request.signal.as_ref().is_some_and(|s| s.is_aborted()) {
                debug!(x = request.x, y = request.y, "in-memory tile request aborted");
                return Err(SourceError::aborted());
            }
            let ts = self.tile_size;
            let x0 = request.x.saturating_mul(ts);
            let y0 = request.y.saturating_mul(ts);
            if x0 >= self.width || y0 >= self.height {
                return Err(SourceError::precondition(format!(
                    "tile ({}, {}) outside {}x{} plane",
                    request.x, request.y, self.width, self.height
                )));
            }
            let window = PixelWindow::new(
                [x0, (x0 + ts).min(self.width)],
                [y0, (y0 + ts).min(self.height)],
            );
            self.read(&RasterRequest {
                selection: request.selection,
                window: Some(window),
            })
        })
    }
}

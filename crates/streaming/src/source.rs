//! Pixel source abstraction for multiscale image pyramids.
//!
//! One `PixelSource` is one resolution level of a pyramid. Implementations
//! decode chunks from wherever the image lives (Zarr store, HTTP, memory) and
//! must tolerate concurrent calls.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::buffer::Raster;
use crate::dtype::DataType;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Shared handle to one pyramid level.
pub type PyramidLevel = Arc<dyn PixelSource>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Caller misuse (missing axes, wrong dtype). Not worth retrying.
    Precondition,
    /// Network or decode failure.
    Transient,
    /// The caller's abort signal fired.
    Aborted,
}

/// Error type for pixel source operations.
#[derive(Debug)]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Precondition, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Transient, message)
    }

    pub fn aborted() -> Self {
        Self::new(SourceErrorKind::Aborted, "request aborted")
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: SourceErrorKind::Transient,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_precondition(&self) -> bool {
        self.kind == SourceErrorKind::Precondition
    }
}

/// Indices for every non-spatial axis (channel, z, t, ...), in axis order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Selection(pub Vec<usize>);

impl Selection {
    pub fn new(indices: impl Into<Vec<usize>>) -> Self {
        Self(indices.into())
    }
}

/// Half-open pixel ranges `[start, end)` on each spatial axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelWindow {
    pub x: [u32; 2],
    pub y: [u32; 2],
}

impl PixelWindow {
    pub fn new(x: [u32; 2], y: [u32; 2]) -> Self {
        Self { x, y }
    }

    pub fn width(&self) -> u32 {
        self.x[1].saturating_sub(self.x[0])
    }

    pub fn height(&self) -> u32 {
        self.y[1].saturating_sub(self.y[0])
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Best-effort cancellation flag shared between a caller and a source.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterRequest {
    pub selection: Selection,
    /// `None` fetches the whole plane.
    pub window: Option<PixelWindow>,
}

#[derive(Debug, Clone)]
pub struct TileRequest {
    pub x: u32,
    pub y: u32,
    pub selection: Selection,
    pub signal: Option<AbortSignal>,
}

/// One resolution level of a multiscale image.
///
/// Methods return boxed futures for dyn-compatibility.
pub trait PixelSource: Send + Sync {
    /// Dimension sizes, one per axis label.
    fn shape(&self) -> &[usize];

    fn labels(&self) -> &[String];

    fn tile_size(&self) -> u32;

    fn dtype(&self) -> DataType;

    fn get_raster(&self, request: RasterRequest) -> BoxFuture<'_, Result<Raster, SourceError>>;

    fn get_tile(&self, request: TileRequest) -> BoxFuture<'_, Result<Raster, SourceError>>;
}

impl std::fmt::Debug for dyn PixelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelSource")
            .field("shape", &self.shape())
            .field("labels", &self.labels())
            .field("dtype", &self.dtype())
            .finish()
    }
}

/// Width/height of a level, read through its `x`/`y` axis labels.
pub fn dimensions(source: &dyn PixelSource) -> Result<Dimensions, SourceError> {
    let labels = source.labels();
    let x = labels.iter().position(|l| l == "x");
    let y = labels.iter().position(|l| l == "y");
    let (Some(x), Some(y)) = (x, y) else {
        return Err(SourceError::precondition(format!(
            "expected pixel source with x/y axes, got {labels:?}"
        )));
    };
    let shape = source.shape();
    match (shape.get(x), shape.get(y)) {
        (Some(&w), Some(&h)) => match (u32::try_from(w), u32::try_from(h)) {
            (Ok(w), Ok(h)) => Ok(Dimensions::new(w, h)),
            _ => Err(SourceError::precondition(format!(
                "plane {w}x{h} exceeds the supported size"
            ))),
        },
        _ => Err(SourceError::precondition(format!(
            "shape {shape:?} does not cover axes {labels:?}"
        ))),
    }
}

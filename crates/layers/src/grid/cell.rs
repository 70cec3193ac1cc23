use foundation::Bounds;
use streaming::{DataType, PixelBuffer, PyramidLevel};

/// One well of the plate: its position and resolution pyramid, finest first.
#[derive(Debug, Clone)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
    pub name: String,
    pub levels: Vec<PyramidLevel>,
}

impl GridCell {
    pub fn new(row: u32, col: u32, name: impl Into<String>, levels: Vec<PyramidLevel>) -> Self {
        Self {
            row,
            col,
            name: name.into(),
            levels,
        }
    }
}

/// Fetched pixels for one cell at one resolution level.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTile {
    pub row: u32,
    pub col: u32,
    pub name: String,
    pub level: usize,
    /// `None` when no selection was fetched.
    pub dtype: Option<DataType>,
    /// One buffer per selection, in selection order.
    pub channels: Vec<PixelBuffer>,
    pub width: u32,
    pub height: u32,
    /// Where the pixels land, in full-resolution grid coordinates.
    pub bounds: Bounds,
    /// The whole cell was fetched rather than a viewport window.
    pub full_cell: bool,
}

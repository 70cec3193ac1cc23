//! Cell placement and viewport windowing in full-resolution grid space.

use foundation::Bounds;
use streaming::{Dimensions, PixelWindow};

/// Full-resolution footprint of cell (`row`, `col`).
pub fn cell_bounds(row: u32, col: u32, full: Dimensions, spacer: f64) -> Bounds {
    let (w, h) = (full.width as f64, full.height as f64);
    Bounds::from_origin_size(col as f64 * (w + spacer), row as f64 * (h + spacer), w, h)
}

/// Extent of the whole grid, trailing spacers included.
pub fn grid_extent(rows: u32, columns: u32, full: Dimensions, spacer: f64) -> Bounds {
    Bounds::new(
        0.0,
        0.0,
        columns as f64 * (full.width as f64 + spacer),
        rows as f64 * (full.height as f64 + spacer),
    )
}

/// Row and column containing a grid-space point. May be negative or past
/// the last row/column; the caller bounds-checks.
pub fn cell_at(x: f64, y: f64, full: Dimensions, spacer: f64) -> (i64, i64) {
    let row = (y / (full.height as f64 + spacer)).floor();
    let col = (x / (full.width as f64 + spacer)).floor();
    (row as i64, col as i64)
}

/// Level pixels to request for the visible part of one cell.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CellWindow {
    /// `None` when the window covers the whole level.
    pub window: Option<PixelWindow>,
    /// Footprint of the requested pixels in grid space.
    pub bounds: Bounds,
}

/// Maps the visible part of `cell` to a pixel window on a level of size
/// `level`. Edges snap outward to whole pixels and the window is never
/// smaller than 1x1.
pub fn pixel_window(
    cell: &Bounds,
    visible: &Bounds,
    full: Dimensions,
    level: Dimensions,
) -> CellWindow {
    if full.is_empty() || level.is_empty() {
        return CellWindow {
            window: None,
            bounds: *cell,
        };
    }
    let sx = level.width as f64 / full.width as f64;
    let sy = level.height as f64 / full.height as f64;
    let x = axis_range(
        visible.left - cell.left,
        visible.right - cell.left,
        sx,
        level.width,
    );
    let y = axis_range(
        visible.top - cell.top,
        visible.bottom - cell.top,
        sy,
        level.height,
    );
    if x == [0, level.width] && y == [0, level.height] {
        return CellWindow {
            window: None,
            bounds: *cell,
        };
    }
    let bounds = Bounds::new(
        cell.left + x[0] as f64 / sx,
        cell.top + y[0] as f64 / sy,
        cell.left + x[1] as f64 / sx,
        cell.top + y[1] as f64 / sy,
    )
    .clamp_to(cell);
    CellWindow {
        window: Some(PixelWindow::new(x, y)),
        bounds,
    }
}

fn axis_range(start: f64, end: f64, scale: f64, len: u32) -> [u32; 2] {
    let limit = len as f64;
    let mut lo = (start * scale).floor().clamp(0.0, limit) as u32;
    let hi = (end * scale).ceil().clamp(0.0, limit) as u32;
    if hi > lo {
        return [lo, hi];
    }
    if lo >= len {
        lo = len - 1;
    }
    [lo, lo + 1]
}

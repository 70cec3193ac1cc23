//! Choosing which pyramid level to fetch for the current zoom.

use foundation::Mat4;
use streaming::{Dimensions, dimensions};

use crate::error::LayerError;
use crate::grid::cell::GridCell;
use crate::viewport::Viewport;

/// A level is sharp enough once each data pixel covers half a screen pixel.
pub const MIN_PIXELS_PER_DATA_PIXEL: f64 = 0.5;

/// Coarsest level every cell has, `min(level count) - 1`, floored at zero.
pub fn max_valid_level(cells: &[GridCell]) -> usize {
    cells
        .iter()
        .map(|c| c.levels.len())
        .min()
        .unwrap_or(0)
        .saturating_sub(1)
}

/// Finest-level size of the first cell with any levels; zero when none do.
pub fn full_resolution_size(cells: &[GridCell]) -> Result<Dimensions, LayerError> {
    match cells.iter().find_map(|c| c.levels.first()) {
        Some(level) => Ok(dimensions(level.as_ref())?),
        None => Ok(Dimensions::default()),
    }
}

/// Sizes of levels `0..=max_valid_level`, read from the first cell.
pub fn level_dimensions(cells: &[GridCell]) -> Result<Vec<Dimensions>, LayerError> {
    let Some(cell) = cells.iter().find(|c| !c.levels.is_empty()) else {
        return Ok(Vec::new());
    };
    cell.levels
        .iter()
        .take(max_valid_level(cells) + 1)
        .map(|level| dimensions(level.as_ref()).map_err(LayerError::from))
        .collect()
}

/// On-screen size of one full-resolution cell, in device pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

/// Projects the cell's model-space corners to screen and measures the
/// edges. `None` without a viewport or for an empty cell.
pub fn cell_screen_size(
    viewport: Option<&dyn Viewport>,
    full: Dimensions,
    model_matrix: Option<&Mat4>,
) -> Option<ScreenSize> {
    let viewport = viewport?;
    if full.is_empty() {
        return None;
    }
    let (w, h) = (full.width as f64, full.height as f64);
    let to_screen = |x: f64, y: f64| {
        let [wx, wy] = match model_matrix {
            Some(m) => m.transform_point_2d(x, y),
            None => [x, y],
        };
        viewport.project([wx, wy, 0.0])
    };
    let origin = to_screen(0.0, 0.0);
    let right = to_screen(w, 0.0);
    let below = to_screen(0.0, h);
    Some(ScreenSize {
        width: (right[0] - origin[0]).abs(),
        height: (below[1] - origin[1]).abs(),
    })
}

/// Finest level whose pixels are at least `MIN_PIXELS_PER_DATA_PIXEL` on
/// screen, else the coarsest. Keeps `current` when the size is unknown.
/// Empty levels are never selected by the scan.
pub fn select_level(levels: &[Dimensions], screen: Option<ScreenSize>, current: usize) -> usize {
    let Some(screen) = screen else {
        return current;
    };
    if levels.is_empty() {
        return current;
    }
    levels
        .iter()
        .position(|d| {
            if d.is_empty() {
                return false;
            }
            let ratio = (screen.width / d.width as f64).min(screen.height / d.height as f64);
            ratio >= MIN_PIXELS_PER_DATA_PIXEL
        })
        .unwrap_or(levels.len() - 1)
}

//! Camera fitting and axis stepping helpers for hosts.

use foundation::{Bounds, Mat4};
use streaming::{Dimensions, Selection};

use crate::viewport::OrthographicViewport;

/// Wheel delta (CSS pixels) that advances an axis by one index.
pub const AXIS_SCROLL_STEP_DELTA: f64 = 40.0;

/// Turns wheel deltas into index steps along one non-spatial axis (z, t).
#[derive(Debug, Clone, Default)]
pub struct AxisScroll {
    accumulated: f64,
}

impl AxisScroll {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops any partial step, e.g. when the user switches axes.
    pub fn reset(&mut self) {
        self.accumulated = 0.0;
    }

    /// Feeds one wheel event. On a whole step, writes the new index for
    /// `axis` into every selection and returns it.
    ///
    /// The first selection holds the current index; the result is clamped to
    /// `[0, axis_len - 1]`. Leftover delta carries into the next call.
    pub fn scroll(
        &mut self,
        delta_y: f64,
        axis: usize,
        axis_len: usize,
        selections: &mut [Selection],
    ) -> Option<usize> {
        let max_index = axis_len.checked_sub(1).filter(|&m| m > 0)?;
        let current = selections.first()?.0.get(axis).copied().unwrap_or(0);

        self.accumulated += delta_y;
        let steps = (self.accumulated / AXIS_SCROLL_STEP_DELTA).trunc();
        if steps == 0.0 {
            return None;
        }
        self.accumulated -= steps * AXIS_SCROLL_STEP_DELTA;

        let next = (current as f64 + steps).clamp(0.0, max_index as f64) as usize;
        if next == current {
            return None;
        }
        for selection in selections.iter_mut() {
            if let Some(slot) = selection.0.get_mut(axis) {
                *slot = next;
            }
        }
        Some(next)
    }
}

/// Screen padding used when fitting, by viewport width.
pub fn fit_padding(viewport_width: f64) -> f64 {
    if viewport_width < 400.0 {
        10.0
    } else if viewport_width < 600.0 {
        30.0
    } else {
        50.0
    }
}

/// Camera that centres `image` (after `model_matrix`) inside `viewport`.
///
/// Returns `None` for an empty image.
pub fn fit_image_to_viewport(
    image: Dimensions,
    viewport: &OrthographicViewport,
    padding: f64,
    model_matrix: Option<&Mat4>,
) -> Option<OrthographicViewport> {
    let (w, h) = (image.width as f64, image.height as f64);
    let m = model_matrix.copied().unwrap_or(Mat4::IDENTITY);
    let corners = [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]].map(|[x, y]| m.transform_point_2d(x, y));
    let b = Bounds::from_corners(corners);
    if b.width() <= 0.0 || b.height() <= 0.0 {
        return None;
    }
    let available_w = viewport.width - 2.0 * padding;
    let available_h = viewport.height - 2.0 * padding;
    let zoom = (available_w / b.width()).min(available_h / b.height()).log2();
    Some(OrthographicViewport::new(
        [(b.left + b.right) / 2.0, (b.top + b.bottom) / 2.0],
        zoom,
        viewport.width,
        viewport.height,
    ))
}

/// Total extent of a plate grid in full-resolution pixels.
pub fn grid_image_size(cell: Dimensions, rows: u32, columns: u32, spacer: f64) -> [f64; 2] {
    [
        (cell.width as f64 + spacer) * columns as f64,
        (cell.height as f64 + spacer) * rows as f64,
    ]
}

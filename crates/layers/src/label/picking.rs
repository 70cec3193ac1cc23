use foundation::{Bounds, Mat4};
use streaming::Raster;

use crate::label::colors::ValueMap;
use crate::picking::LabelPick;

#[derive(Debug, Clone, PartialEq)]
pub enum LabelPickOutcome {
    Hit { pick: LabelPick, pixel: usize },
    Miss,
    /// The tile's render bounds have zero width or height.
    DegenerateBounds,
}

/// Reads the label under `coordinate` from a tile drawn into `bounds`.
///
/// `model_inverse` maps world coordinates back into image space; identity
/// is skipped. The pixel is clamped to the raster, so points just past an
/// edge read the edge pixel.
pub fn pick_label(
    coordinate: [f64; 2],
    bounds: &Bounds,
    raster: &Raster,
    model_inverse: Option<&Mat4>,
    values: Option<&ValueMap>,
) -> LabelPickOutcome {
    let [mut x, mut y] = coordinate;
    if let Some(inv) = model_inverse
        && !inv.is_identity()
    {
        [x, y] = inv.transform_point_2d(x, y);
    }
    if bounds.width() == 0.0 || bounds.height() == 0.0 {
        return LabelPickOutcome::DegenerateBounds;
    }
    if raster.width == 0 || raster.height == 0 {
        return LabelPickOutcome::Miss;
    }

    let (w, h) = (i64::from(raster.width), i64::from(raster.height));
    let norm_x = (x - bounds.left) / bounds.width();
    let norm_y = (y - bounds.top) / bounds.height();
    let px = ((norm_x * w as f64).floor() as i64).clamp(0, w - 1);
    let py = ((norm_y * h as f64).floor() as i64).clamp(0, h - 1);
    let pixel = (py * w + px) as usize;

    let Some(label) = raster.data.label_at(pixel) else {
        return LabelPickOutcome::Miss;
    };
    let value = values.and_then(|map| {
        u32::try_from(label)
            .ok()
            .and_then(|id| map.get(&id).cloned().flatten())
    });
    LabelPickOutcome::Hit {
        pick: LabelPick { label, value },
        pixel,
    }
}

//! Screen <-> world mapping for a 2D image viewer.

use foundation::{Bounds, Mat4};
use serde::{Deserialize, Serialize};

/// What the layers need from the host's camera.
pub trait Viewport {
    /// Screen width in CSS pixels.
    fn width(&self) -> f64;

    fn height(&self) -> f64;

    /// Log2 of screen pixels per world unit.
    fn zoom(&self) -> f64;

    fn project(&self, world: [f64; 3]) -> [f64; 2];

    fn unproject(&self, screen: [f64; 2]) -> [f64; 3];
}

/// Orthographic 2D camera: `target` is the world point at the screen centre.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrthographicViewport {
    pub target: [f64; 2],
    #[serde(default)]
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
}

impl OrthographicViewport {
    pub fn new(target: [f64; 2], zoom: f64, width: f64, height: f64) -> Self {
        Self {
            target,
            zoom,
            width,
            height,
        }
    }

    pub fn scale(&self) -> f64 {
        self.zoom.exp2()
    }
}

impl Viewport for OrthographicViewport {
    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn project(&self, world: [f64; 3]) -> [f64; 2] {
        let s = self.scale();
        [
            (world[0] - self.target[0]) * s + self.width / 2.0,
            (world[1] - self.target[1]) * s + self.height / 2.0,
        ]
    }

    fn unproject(&self, screen: [f64; 2]) -> [f64; 3] {
        let s = self.scale();
        [
            (screen[0] - self.width / 2.0) / s + self.target[0],
            (screen[1] - self.height / 2.0) / s + self.target[1],
            0.0,
        ]
    }
}

/// Screen-space rectangle a host wants to draw into.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CullRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CullRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The rectangle unprojected into world space.
    pub fn world_bounds(&self, viewport: &dyn Viewport) -> Bounds {
        let screen = Bounds::from_origin_size(self.x, self.y, self.width, self.height);
        Bounds::from_corners(screen.corners().map(|c| {
            let [x, y, _] = viewport.unproject(c);
            [x, y]
        }))
    }
}

/// Visible region in the layer's local (pre-model-matrix) space.
///
/// A non-invertible model matrix is treated as identity.
pub fn visible_bounds(viewport: &dyn Viewport, model_matrix: Option<&Mat4>) -> Bounds {
    let inverse = model_matrix.and_then(Mat4::invert);
    let screen = Bounds::new(0.0, 0.0, viewport.width(), viewport.height());
    Bounds::from_corners(screen.corners().map(|c| {
        let [x, y, _] = viewport.unproject(c);
        match &inverse {
            Some(inv) => inv.transform_point_2d(x, y),
            None => [x, y],
        }
    }))
}

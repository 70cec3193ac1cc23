use crate::math::Mat4;

/// Axis-aligned rectangle in image space (y grows downward, so `top <= bottom`).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Bounds {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Smallest rectangle containing every point; `None` for an empty set.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = [f64; 2]>,
    {
        let mut iter = points.into_iter();
        let [x0, y0] = iter.next()?;
        let mut b = Self::new(x0, y0, x0, y0);
        for [x, y] in iter {
            b.left = b.left.min(x);
            b.right = b.right.max(x);
            b.top = b.top.min(y);
            b.bottom = b.bottom.max(y);
        }
        Some(b)
    }

    /// Hull of exactly four corner points.
    pub fn from_corners(corners: [[f64; 2]; 4]) -> Self {
        let [[x0, y0], rest @ ..] = corners;
        rest.iter().fold(Self::new(x0, y0, x0, y0), |b, &[x, y]| {
            Self::new(b.left.min(x), b.top.min(y), b.right.max(x), b.bottom.max(y))
        })
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn corners(&self) -> [[f64; 2]; 4] {
        [
            [self.left, self.top],
            [self.right, self.top],
            [self.left, self.bottom],
            [self.right, self.bottom],
        ]
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Overlapping region, or `None` when the overlap has zero or negative area.
    pub fn intersect(&self, other: &Bounds) -> Option<Bounds> {
        let b = Bounds::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        (b.right > b.left && b.bottom > b.top).then_some(b)
    }

    /// Strict overlap test; touching edges do not overlap.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.top < other.bottom
            && self.bottom > other.top
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Bounds {
        Bounds::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    pub fn clamp_to(&self, limit: &Bounds) -> Bounds {
        Bounds::new(
            self.left.clamp(limit.left, limit.right),
            self.top.clamp(limit.top, limit.bottom),
            self.right.clamp(limit.left, limit.right),
            self.bottom.clamp(limit.top, limit.bottom),
        )
    }

    /// Hull of the four transformed corners.
    pub fn transform(&self, m: &Mat4) -> Bounds {
        Bounds::from_corners(self.corners().map(|[x, y]| m.transform_point_2d(x, y)))
    }
}

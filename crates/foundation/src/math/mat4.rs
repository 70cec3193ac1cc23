/// 4x4 affine transform stored column-major (`m[col * 4 + row]`), the same
/// layout render engines upload as a `mat4` uniform.
///
/// Points are treated as column vectors, so `a.multiply(&b)` applies `b`
/// first and `a` second.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mat4(pub [f64; 16]);

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub fn from_scale(sx: f64, sy: f64, sz: f64) -> Self {
        let mut m = Self::IDENTITY;
        m.0[0] = sx;
        m.0[5] = sy;
        m.0[10] = sz;
        m
    }

    pub fn from_translation(tx: f64, ty: f64, tz: f64) -> Self {
        let mut m = Self::IDENTITY;
        m.0[12] = tx;
        m.0[13] = ty;
        m.0[14] = tz;
        m
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn multiply(&self, other: &Mat4) -> Mat4 {
        let a = &self.0;
        let b = &other.0;
        let mut out = [0.0; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
            }
        }
        Mat4(out)
    }

    /// Transforms a point, including the perspective divide.
    pub fn transform_point(&self, p: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        let [x, y, z] = p;
        let mut w = m[3] * x + m[7] * y + m[11] * z + m[15];
        if w == 0.0 {
            w = 1.0;
        }
        [
            (m[0] * x + m[4] * y + m[8] * z + m[12]) / w,
            (m[1] * x + m[5] * y + m[9] * z + m[13]) / w,
            (m[2] * x + m[6] * y + m[10] * z + m[14]) / w,
        ]
    }

    pub fn transform_point_2d(&self, x: f64, y: f64) -> [f64; 2] {
        let [tx, ty, _] = self.transform_point([x, y, 0.0]);
        [tx, ty]
    }

    /// Per-axis scale (length of the first three basis columns).
    pub fn scale(&self) -> [f64; 3] {
        let m = &self.0;
        let len = |c: usize| (m[c * 4].powi(2) + m[c * 4 + 1].powi(2) + m[c * 4 + 2].powi(2)).sqrt();
        [len(0), len(1), len(2)]
    }

    /// General inverse via cofactor expansion.
    ///
    /// Returns `None` when the determinant is zero or not finite.
    pub fn invert(&self) -> Option<Mat4> {
        let a = &self.0;
        let (a00, a01, a02, a03) = (a[0], a[1], a[2], a[3]);
        let (a10, a11, a12, a13) = (a[4], a[5], a[6], a[7]);
        let (a20, a21, a22, a23) = (a[8], a[9], a[10], a[11]);
        let (a30, a31, a32, a33) = (a[12], a[13], a[14], a[15]);

        let b00 = a00 * a11 - a01 * a10;
        let b01 = a00 * a12 - a02 * a10;
        let b02 = a00 * a13 - a03 * a10;
        let b03 = a01 * a12 - a02 * a11;
        let b04 = a01 * a13 - a03 * a11;
        let b05 = a02 * a13 - a03 * a12;
        let b06 = a20 * a31 - a21 * a30;
        let b07 = a20 * a32 - a22 * a30;
        let b08 = a20 * a33 - a23 * a30;
        let b09 = a21 * a32 - a22 * a31;
        let b10 = a21 * a33 - a23 * a31;
        let b11 = a22 * a33 - a23 * a32;

        let det = b00 * b11 - b01 * b10 + b02 * b09 + b03 * b08 - b04 * b07 + b05 * b06;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;

        Some(Mat4([
            (a11 * b11 - a12 * b10 + a13 * b09) * inv,
            (a02 * b10 - a01 * b11 - a03 * b09) * inv,
            (a31 * b05 - a32 * b04 + a33 * b03) * inv,
            (a22 * b04 - a21 * b05 - a23 * b03) * inv,
            (a12 * b08 - a10 * b11 - a13 * b07) * inv,
            (a00 * b11 - a02 * b08 + a03 * b07) * inv,
            (a32 * b02 - a30 * b05 - a33 * b01) * inv,
            (a20 * b05 - a22 * b02 + a23 * b01) * inv,
            (a10 * b10 - a11 * b08 + a13 * b06) * inv,
            (a01 * b08 - a00 * b10 - a03 * b06) * inv,
            (a30 * b04 - a31 * b02 + a33 * b00) * inv,
            (a21 * b02 - a20 * b04 - a23 * b00) * inv,
            (a11 * b07 - a10 * b09 - a12 * b06) * inv,
            (a00 * b09 - a01 * b07 + a02 * b06) * inv,
            (a31 * b01 - a30 * b03 - a32 * b00) * inv,
            (a20 * b03 - a21 * b01 + a22 * b00) * inv,
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::Mat4;

    fn approx(a: [f64; 3], b: [f64; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    #[test]
    fn translate_then_scale_order() {
        let t = Mat4::from_translation(10.0, 20.0, 0.0);
        let s = Mat4::from_scale(2.0, 3.0, 1.0);
        // scale first, then translate
        let m = t.multiply(&s);
        assert!(approx(m.transform_point([1.0, 1.0, 0.0]), [12.0, 23.0, 0.0]));
    }

    #[test]
    fn inverse_round_trips_points() {
        let m = Mat4::from_translation(-4.0, 7.5, 1.0).multiply(&Mat4::from_scale(0.5, 4.0, 2.0));
        let inv = m.invert().expect("invertible");
        let p = [3.0, -2.0, 5.0];
        assert!(approx(inv.transform_point(m.transform_point(p)), p));
        assert!(m.multiply(&inv).0.iter().zip(Mat4::IDENTITY.0.iter()).all(|(a, b)| (a - b).abs() < 1e-12));
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        assert!(Mat4::from_scale(0.0, 1.0, 1.0).invert().is_none());
    }

    #[test]
    fn scale_reads_column_lengths() {
        let m = Mat4::from_translation(5.0, 5.0, 0.0).multiply(&Mat4::from_scale(2.0, 0.25, 1.0));
        assert_eq!(m.scale(), [2.0, 0.25, 1.0]);
        assert!(Mat4::IDENTITY.is_identity());
        assert!(!m.is_identity());
    }
}

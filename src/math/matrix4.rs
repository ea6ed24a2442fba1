//! 4x4 matrix, column-major.

use super::{Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// A 4x4 matrix stored column-major, matching GPU buffer layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix4 {
    /// Matrix elements in column-major order.
    pub elements: [f32; 16],
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix4 {
    /// Identity matrix.
    pub const IDENTITY: Self = Self {
        elements: [
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    /// Create from a column-major element array.
    #[inline]
    pub const fn from_cols_array(elements: [f32; 16]) -> Self {
        Self { elements }
    }

    /// Create a translation matrix.
    pub fn from_translation(v: &Vector3) -> Self {
        let mut m = Self::IDENTITY;
        m.elements[12] = v.x;
        m.elements[13] = v.y;
        m.elements[14] = v.z;
        m
    }

    /// Create a non-uniform scale matrix.
    pub fn from_scale(v: &Vector3) -> Self {
        let mut m = Self::IDENTITY;
        m.elements[0] = v.x;
        m.elements[5] = v.y;
        m.elements[10] = v.z;
        m
    }

    /// Create a right-handed look-at view matrix.
    pub fn look_at(eye: &Vector3, target: &Vector3, up: &Vector3) -> Self {
        let f = (*target - *eye).normalized();
        let s = f.cross(up).normalized();
        let u = s.cross(&f);

        Self::from_cols_array([
            s.x, u.x, -f.x, 0.0,
            s.y, u.y, -f.y, 0.0,
            s.z, u.z, -f.z, 0.0,
            -s.dot(eye), -u.dot(eye), f.dot(eye), 1.0,
        ])
    }

    /// Create a right-handed perspective projection with 0..1 depth range.
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let f = 1.0 / (fov_y * 0.5).tan();
        let range = near - far;

        Self::from_cols_array([
            f / aspect, 0.0, 0.0, 0.0,
            0.0, f, 0.0, 0.0,
            0.0, 0.0, far / range, -1.0,
            0.0, 0.0, far * near / range, 0.0,
        ])
    }

    /// Create a right-handed orthographic projection with 0..1 depth range.
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        let rw = 1.0 / (right - left);
        let rh = 1.0 / (top - bottom);
        let rd = 1.0 / (near - far);

        Self::from_cols_array([
            2.0 * rw, 0.0, 0.0, 0.0,
            0.0, 2.0 * rh, 0.0, 0.0,
            0.0, 0.0, rd, 0.0,
            -(right + left) * rw, -(top + bottom) * rh, near * rd, 1.0,
        ])
    }

    /// Matrix product `self * other`.
    pub fn multiply(&self, other: &Matrix4) -> Self {
        let a = &self.elements;
        let b = &other.elements;
        let mut out = [0.0f32; 16];

        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = a[row] * b[col * 4]
                    + a[4 + row] * b[col * 4 + 1]
                    + a[8 + row] * b[col * 4 + 2]
                    + a[12 + row] * b[col * 4 + 3];
            }
        }

        Self { elements: out }
    }

    /// Transform a point, applying the perspective divide.
    pub fn transform_point(&self, v: &Vector3) -> Vector3 {
        self.transform_vector4(Vector4::from_point(*v)).to_point()
    }

    /// Transform a direction (w = 0, no translation).
    pub fn transform_direction(&self, v: &Vector3) -> Vector3 {
        let e = &self.elements;
        Vector3::new(
            e[0] * v.x + e[4] * v.y + e[8] * v.z,
            e[1] * v.x + e[5] * v.y + e[9] * v.z,
            e[2] * v.x + e[6] * v.y + e[10] * v.z,
        )
    }

    /// Transform a homogeneous vector without dividing.
    pub fn transform_vector4(&self, v: Vector4) -> Vector4 {
        let e = &self.elements;
        Vector4::new(
            e[0] * v.x + e[4] * v.y + e[8] * v.z + e[12] * v.w,
            e[1] * v.x + e[5] * v.y + e[9] * v.z + e[13] * v.w,
            e[2] * v.x + e[6] * v.y + e[10] * v.z + e[14] * v.w,
            e[3] * v.x + e[7] * v.y + e[11] * v.z + e[15] * v.w,
        )
    }

    /// The largest column scale factor. Used to bound transformed sphere radii.
    pub fn max_scale(&self) -> f32 {
        let e = &self.elements;
        let sx = e[0] * e[0] + e[1] * e[1] + e[2] * e[2];
        let sy = e[4] * e[4] + e[5] * e[5] + e[6] * e[6];
        let sz = e[8] * e[8] + e[9] * e[9] + e[10] * e[10];
        sx.max(sy).max(sz).sqrt()
    }

    /// Return the transposed matrix.
    pub fn transposed(&self) -> Self {
        let e = &self.elements;
        Self::from_cols_array([
            e[0], e[4], e[8], e[12],
            e[1], e[5], e[9], e[13],
            e[2], e[6], e[10], e[14],
            e[3], e[7], e[11], e[15],
        ])
    }

    /// Return the inverse matrix. Singular matrices return identity.
    pub fn inverse(&self) -> Self {
        let m = &self.elements;

        let a00 = m[0];
        let a01 = m[1];
        let a02 = m[2];
        let a03 = m[3];
        let a10 = m[4];
        let a11 = m[5];
        let a12 = m[6];
        let a13 = m[7];
        let a20 = m[8];
        let a21 = m[9];
        let a22 = m[10];
        let a23 = m[11];
        let a30 = m[12];
        let a31 = m[13];
        let a32 = m[14];
        let a33 = m[15];

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
        if det == 0.0 {
            return Self::IDENTITY;
        }
        let inv_det = 1.0 / det;

        Self::from_cols_array([
            (a11 * b11 - a12 * b10 + a13 * b09) * inv_det,
            (a02 * b10 - a01 * b11 - a03 * b09) * inv_det,
            (a31 * b05 - a32 * b04 + a33 * b03) * inv_det,
            (a22 * b04 - a21 * b05 - a23 * b03) * inv_det,
            (a12 * b08 - a10 * b11 - a13 * b07) * inv_det,
            (a00 * b11 - a02 * b08 + a03 * b07) * inv_det,
            (a32 * b02 - a30 * b05 - a33 * b01) * inv_det,
            (a20 * b05 - a22 * b02 + a23 * b01) * inv_det,
            (a10 * b10 - a11 * b08 + a13 * b06) * inv_det,
            (a01 * b08 - a00 * b10 - a03 * b06) * inv_det,
            (a30 * b04 - a31 * b02 + a33 * b00) * inv_det,
            (a21 * b02 - a20 * b04 - a23 * b00) * inv_det,
            (a11 * b07 - a10 * b09 - a12 * b06) * inv_det,
            (a00 * b09 - a01 * b07 + a02 * b06) * inv_det,
            (a31 * b01 - a30 * b03 - a32 * b00) * inv_det,
            (a20 * b03 - a21 * b01 + a22 * b00) * inv_det,
        ])
    }

    /// Convert to nested column arrays for GPU upload.
    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        let e = &self.elements;
        [
            [e[0], e[1], e[2], e[3]],
            [e[4], e[5], e[6], e[7]],
            [e[8], e[9], e[10], e[11]],
            [e[12], e[13], e[14], e[15]],
        ]
    }
}

impl std::ops::Mul for Matrix4 {
    type Output = Self;
    fn mul(self, other: Self) -> Self {
        self.multiply(&other)
    }
}

impl From<glam::Mat4> for Matrix4 {
    fn from(m: glam::Mat4) -> Self {
        Self::from_cols_array(m.to_cols_array())
    }
}

impl From<Matrix4> for glam::Mat4 {
    fn from(m: Matrix4) -> Self {
        glam::Mat4::from_cols_array(&m.elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: &Matrix4, b: &Matrix4) -> bool {
        a.elements
            .iter()
            .zip(b.elements.iter())
            .all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = Matrix4::perspective(1.0, 1.5, 0.1, 100.0);
        let round = m.multiply(&m.inverse());
        assert!(approx_eq(&round, &Matrix4::IDENTITY));
    }

    #[test]
    fn test_perspective_depth_range() {
        let m = Matrix4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.5, 50.0);
        // A point on the near plane projects to depth 0, far plane to depth 1.
        let near = m.transform_point(&Vector3::new(0.0, 0.0, -0.5));
        let far = m.transform_point(&Vector3::new(0.0, 0.0, -50.0));
        assert!(near.z.abs() < 1e-5);
        assert!((far.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_transform_point_translation() {
        let m = Matrix4::from_translation(&Vector3::new(1.0, 2.0, 3.0));
        let p = m.transform_point(&Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(p, Vector3::new(2.0, 2.0, 3.0));
    }

    #[test]
    fn test_max_scale() {
        let m = Matrix4::from_scale(&Vector3::new(2.0, -5.0, 1.0));
        assert!((m.max_scale() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_glam_roundtrip() {
        let m = Matrix4::perspective(1.2, 1.0, 0.1, 10.0);
        let g: glam::Mat4 = m.into();
        let back: Matrix4 = g.into();
        assert!(approx_eq(&m, &back));
    }
}

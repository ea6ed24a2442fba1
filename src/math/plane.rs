//! Infinite plane.

use super::Vector3;
use serde::{Deserialize, Serialize};

/// An infinite plane satisfying `normal · point + constant = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Plane {
    /// Plane normal (unit length once normalized).
    pub normal: Vector3,
    /// Signed distance from the origin along the normal.
    pub constant: f32,
}

impl Plane {
    /// Create a new plane.
    #[inline]
    pub const fn new(normal: Vector3, constant: f32) -> Self {
        Self { normal, constant }
    }

    /// Return a copy with unit-length normal, rescaling the constant to match.
    pub fn normalized(&self) -> Self {
        let inv_len = 1.0 / self.normal.length();
        Self {
            normal: self.normal * inv_len,
            constant: self.constant * inv_len,
        }
    }

    /// Signed distance from a point to the plane.
    #[inline]
    pub fn distance_to_point(&self, point: &Vector3) -> f32 {
        self.normal.dot(point) + self.constant
    }
}

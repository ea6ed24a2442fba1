//! 4D homogeneous vector.

use super::Vector3;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// A 4D vector, mostly used as a homogeneous point for (un)projection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Vector4 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
    /// W component.
    pub w: f32,
}

impl Vector4 {
    /// Create a new Vector4.
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Create a homogeneous point (w = 1) from a Vector3.
    #[inline]
    pub const fn from_point(v: Vector3) -> Self {
        Self { x: v.x, y: v.y, z: v.z, w: 1.0 }
    }

    /// Perspective-divide down to a Vector3.
    #[inline]
    pub fn to_point(self) -> Vector3 {
        if self.w != 0.0 {
            Vector3::new(self.x / self.w, self.y / self.w, self.z / self.w)
        } else {
            Vector3::new(self.x, self.y, self.z)
        }
    }

    /// The xyz components without the divide.
    #[inline]
    pub const fn xyz(self) -> Vector3 {
        Vector3 { x: self.x, y: self.y, z: self.z }
    }
}

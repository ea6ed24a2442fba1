//! Axis-aligned bounding box.

use super::Vector3;
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Box3 {
    /// Minimum corner.
    pub min: Vector3,
    /// Maximum corner.
    pub max: Vector3,
}

impl Default for Box3 {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Box3 {
    /// Empty box (inverted, ready to expand).
    pub const EMPTY: Self = Self {
        min: Vector3 { x: f32::INFINITY, y: f32::INFINITY, z: f32::INFINITY },
        max: Vector3 { x: f32::NEG_INFINITY, y: f32::NEG_INFINITY, z: f32::NEG_INFINITY },
    };

    /// Create a new box.
    #[inline]
    pub const fn new(min: Vector3, max: Vector3) -> Self {
        Self { min, max }
    }

    /// Create a box around an array of points.
    pub fn from_points(points: &[Vector3]) -> Self {
        let mut result = Self::EMPTY;
        for p in points {
            result.expand_by_point(p);
        }
        result
    }

    /// Grow to contain a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: &Vector3) -> &mut Self {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
        self
    }

    /// The box center.
    #[inline]
    pub fn center(&self) -> Vector3 {
        (self.min + self.max) * 0.5
    }

    /// The box dimensions.
    #[inline]
    pub fn size(&self) -> Vector3 {
        self.max - self.min
    }

    /// Squared distance from a point to the box surface; zero inside.
    pub fn squared_distance_to_point(&self, p: &Vector3) -> f32 {
        let clamped = p.max(&self.min).min(&self.max);
        clamped.distance_to_squared(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand() {
        let b = Box3::from_points(&[Vector3::new(1.0, -1.0, 0.0), Vector3::new(-2.0, 3.0, 5.0)]);
        assert_eq!(b.min, Vector3::new(-2.0, -1.0, 0.0));
        assert_eq!(b.max, Vector3::new(1.0, 3.0, 5.0));
    }

    #[test]
    fn test_squared_distance() {
        let b = Box3::new(Vector3::ZERO, Vector3::ONE);
        assert_eq!(b.squared_distance_to_point(&Vector3::splat(0.5)), 0.0);
        assert_eq!(b.squared_distance_to_point(&Vector3::new(2.0, 0.0, 0.0)), 1.0);
    }
}

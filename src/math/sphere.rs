//! Bounding sphere.

use super::{Box3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

/// A bounding sphere defined by center and radius.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sphere {
    /// Center of the sphere.
    pub center: Vector3,
    /// Radius of the sphere.
    pub radius: f32,
}

impl Sphere {
    /// Create a new sphere.
    #[inline]
    pub const fn new(center: Vector3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Create the tightest sphere around a bounding box.
    pub fn from_box3(box3: &Box3) -> Self {
        let center = box3.center();
        Self {
            center,
            radius: center.distance_to(&box3.max),
        }
    }

    /// Transform by a matrix. The radius grows by the largest axis scale so
    /// the result still bounds the transformed volume.
    pub fn transformed(&self, m: &Matrix4) -> Self {
        Self {
            center: m.transform_point(&self.center),
            radius: self.radius * m.max_scale(),
        }
    }

    /// Check whether this sphere overlaps a box, by squared distance from
    /// the center to the box.
    pub fn intersects_box(&self, box3: &Box3) -> bool {
        box3.squared_distance_to_point(&self.center) <= self.radius * self.radius
    }

    /// Check whether this sphere overlaps another.
    pub fn intersects_sphere(&self, other: &Sphere) -> bool {
        let r = self.radius + other.radius;
        self.center.distance_to_squared(&other.center) <= r * r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_box_overlap() {
        let b = Box3::new(Vector3::ZERO, Vector3::ONE);
        assert!(Sphere::new(Vector3::splat(0.5), 0.1).intersects_box(&b));
        assert!(Sphere::new(Vector3::new(2.0, 0.5, 0.5), 1.01).intersects_box(&b));
        assert!(!Sphere::new(Vector3::new(2.0, 0.5, 0.5), 0.99).intersects_box(&b));
    }

    #[test]
    fn test_transformed_scales_radius() {
        let s = Sphere::new(Vector3::ZERO, 1.0);
        let m = Matrix4::from_scale(&Vector3::new(1.0, 3.0, 1.0));
        let t = s.transformed(&m);
        assert!((t.radius - 3.0).abs() < 1e-6);
    }
}

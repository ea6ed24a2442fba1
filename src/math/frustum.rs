//! View frustum for culling.

use super::{Matrix4, Plane, Sphere, Vector3};
use serde::{Deserialize, Serialize};

/// A view frustum defined by six planes, used for visibility tests.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Frustum {
    /// The six planes in left, right, bottom, top, near, far order.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract the frustum planes from a view-projection matrix.
    pub fn from_matrix(m: &Matrix4) -> Self {
        let e = &m.elements;

        // Each plane is a signed combination of matrix rows (Gribb/Hartmann).
        let left = Plane {
            normal: Vector3::new(e[3] + e[0], e[7] + e[4], e[11] + e[8]),
            constant: e[15] + e[12],
        }
        .normalized();

        let right = Plane {
            normal: Vector3::new(e[3] - e[0], e[7] - e[4], e[11] - e[8]),
            constant: e[15] - e[12],
        }
        .normalized();

        let bottom = Plane {
            normal: Vector3::new(e[3] + e[1], e[7] + e[5], e[11] + e[9]),
            constant: e[15] + e[13],
        }
        .normalized();

        let top = Plane {
            normal: Vector3::new(e[3] - e[1], e[7] - e[5], e[11] - e[9]),
            constant: e[15] - e[13],
        }
        .normalized();

        // 0..1 clip depth: the near plane is z >= 0, not z >= -w.
        let near = Plane {
            normal: Vector3::new(e[2], e[6], e[10]),
            constant: e[14],
        }
        .normalized();

        let far = Plane {
            normal: Vector3::new(e[3] - e[2], e[7] - e[6], e[11] - e[10]),
            constant: e[15] - e[14],
        }
        .normalized();

        Self {
            planes: [left, right, bottom, top, near, far],
        }
    }

    /// Check if a point is inside the frustum.
    pub fn contains_point(&self, point: &Vector3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if a sphere intersects the frustum.
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(&sphere.center) >= -sphere.radius)
    }

    /// Pack the planes as `[nx, ny, nz, constant]` rows for GPU upload.
    pub fn to_gpu_planes(&self) -> [[f32; 4]; 6] {
        let mut out = [[0.0f32; 4]; 6];
        for (dst, plane) in out.iter_mut().zip(self.planes.iter()) {
            *dst = [plane.normal.x, plane.normal.y, plane.normal.z, plane.constant];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frustum() -> Frustum {
        let proj = Matrix4::perspective(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0);
        Frustum::from_matrix(&proj)
    }

    #[test]
    fn test_contains_point() {
        let frustum = test_frustum();
        assert!(frustum.contains_point(&Vector3::new(0.0, 0.0, -1.0)));
        assert!(!frustum.contains_point(&Vector3::new(0.0, 0.0, 1.0)));
        assert!(!frustum.contains_point(&Vector3::new(0.0, 0.0, -200.0)));
    }

    #[test]
    fn test_sphere_intersection() {
        let frustum = test_frustum();
        assert!(frustum.intersects_sphere(&Sphere::new(Vector3::new(0.0, 0.0, -5.0), 1.0)));
        // Center outside but radius reaching in.
        assert!(frustum.intersects_sphere(&Sphere::new(Vector3::new(0.0, 0.0, 0.5), 1.0)));
        assert!(!frustum.intersects_sphere(&Sphere::new(Vector3::new(0.0, 0.0, 5.0), 1.0)));
    }
}

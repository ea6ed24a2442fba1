//! Perspective camera.

use super::{Projection, ProjectionKind};
use crate::core::Id;
use crate::math::{Matrix4, Vector3};

/// A perspective projection camera.
pub struct PerspectiveCamera {
    /// Unique ID.
    id: Id,
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Aspect ratio (width / height).
    pub aspect: f32,
    /// Near clipping plane.
    pub near: f32,
    /// Far clipping plane.
    pub far: f32,
    /// Camera position.
    pub position: Vector3,
    /// Camera target (look-at point).
    pub target: Vector3,
    /// Up vector.
    pub up: Vector3,
    view_matrix: Matrix4,
    projection_matrix: Matrix4,
    needs_update: bool,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(60.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}

impl PerspectiveCamera {
    /// Create a new perspective camera.
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            id: Id::new(),
            fov,
            aspect,
            near,
            far,
            position: Vector3::new(0.0, 0.0, 5.0),
            target: Vector3::ZERO,
            up: Vector3::UP,
            view_matrix: Matrix4::IDENTITY,
            projection_matrix: Matrix4::IDENTITY,
            needs_update: true,
        };
        camera.update_matrices();
        camera
    }

    /// Get the unique ID.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Set the camera position.
    pub fn set_position(&mut self, position: Vector3) {
        self.position = position;
        self.needs_update = true;
    }

    /// Look at a target from the current position.
    pub fn look_at(&mut self, target: Vector3) {
        self.target = target;
        self.needs_update = true;
    }

    /// Set the field of view in degrees.
    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov;
        self.needs_update = true;
    }

    /// Set the aspect ratio.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.needs_update = true;
    }

    /// Set near and far planes.
    pub fn set_clip_planes(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.needs_update = true;
    }

    /// Get the view matrix.
    pub fn view_matrix(&mut self) -> Matrix4 {
        if self.needs_update {
            self.update_matrices();
        }
        self.view_matrix
    }

    /// Get the projection matrix.
    pub fn projection_matrix(&mut self) -> Matrix4 {
        if self.needs_update {
            self.update_matrices();
        }
        self.projection_matrix
    }

    /// Get the combined view-projection matrix.
    pub fn view_projection_matrix(&mut self) -> Matrix4 {
        if self.needs_update {
            self.update_matrices();
        }
        self.projection_matrix.multiply(&self.view_matrix)
    }

    /// Get this frame's projection snapshot.
    pub fn projection(&mut self) -> Projection {
        if self.needs_update {
            self.update_matrices();
        }
        Projection {
            kind: ProjectionKind::Perspective,
            near: self.near,
            far: self.far,
            extent: self.fov.to_radians(),
            aspect: self.aspect,
            matrix: self.projection_matrix,
        }
    }

    fn update_matrices(&mut self) {
        self.view_matrix = Matrix4::look_at(&self.position, &self.target, &self.up);
        self.projection_matrix =
            Matrix4::perspective(self.fov.to_radians(), self.aspect, self.near, self.far);
        self.needs_update = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_changes_with_projection_only() {
        let mut camera = PerspectiveCamera::new(60.0, 1.0, 0.1, 100.0);
        let before = camera.projection().signature();

        camera.set_position(Vector3::new(10.0, 0.0, 0.0));
        assert_eq!(camera.projection().signature(), before);

        camera.set_fov(75.0);
        assert_ne!(camera.projection().signature(), before);
    }
}

//! Orthographic camera.

use super::{Projection, ProjectionKind};
use crate::core::Id;
use crate::math::{Matrix4, Vector3};

/// An orthographic projection camera.
pub struct OrthographicCamera {
    /// Unique ID.
    id: Id,
    /// Vertical half-size of the view volume.
    pub half_height: f32,
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

impl OrthographicCamera {
    /// Create a new orthographic camera.
    pub fn new(half_height: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            id: Id::new(),
            half_height,
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

    /// Set the vertical half-size.
    pub fn set_half_height(&mut self, half_height: f32) {
        self.half_height = half_height;
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
            kind: ProjectionKind::Orthographic,
            near: self.near,
            far: self.far,
            extent: self.half_height,
            aspect: self.aspect,
            matrix: self.projection_matrix,
        }
    }

    fn update_matrices(&mut self) {
        let half_width = self.half_height * self.aspect;
        self.view_matrix = Matrix4::look_at(&self.position, &self.target, &self.up);
        self.projection_matrix = Matrix4::orthographic(
            -half_width,
            half_width,
            -self.half_height,
            self.half_height,
            self.near,
            self.far,
        );
        self.needs_update = false;
    }
}

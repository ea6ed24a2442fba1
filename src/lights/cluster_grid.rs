//! View-frustum cluster grid.

use crate::camera::Projection;
use crate::math::{Box3, Sphere, Vector4};

/// One cell of the cluster grid, in view space.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterCell {
    /// View-space bounding volume.
    pub bounds: Box3,
    /// Bounding-sphere center derived from the volume.
    pub center: crate::math::Vector3,
    /// Bounding-sphere radius derived from the volume.
    pub radius: f32,
}

/// A fixed-resolution 3D partition of the view frustum.
///
/// Screen space is tiled `count_x` by `count_y`; depth is carved into
/// `count_z` logarithmic slices so nearby cells stay small where lighting
/// detail matters. Cell volumes depend only on the projection, so the grid
/// is rebuilt when near, far, or field of view change and reused otherwise.
pub struct ClusterGrid {
    count_x: u32,
    count_y: u32,
    count_z: u32,
    cells: Vec<ClusterCell>,
    near: f32,
    far: f32,
    slice_multiplier: f32,
    slice_subtractor: f32,
    signature: Option<(crate::camera::ProjectionKind, f32, f32, f32, f32)>,
}

impl ClusterGrid {
    /// Create an empty grid; call [`ClusterGrid::rebuild`] before use.
    pub fn new(count_x: u32, count_y: u32, count_z: u32) -> Self {
        Self {
            count_x,
            count_y,
            count_z,
            cells: Vec::new(),
            near: 0.1,
            far: 1000.0,
            slice_multiplier: 0.0,
            slice_subtractor: 0.0,
            signature: None,
        }
    }

    /// Cells along screen X.
    #[inline]
    pub fn count_x(&self) -> u32 {
        self.count_x
    }

    /// Cells along screen Y.
    #[inline]
    pub fn count_y(&self) -> u32 {
        self.count_y
    }

    /// Depth slices.
    #[inline]
    pub fn count_z(&self) -> u32 {
        self.count_z
    }

    /// Total cell count.
    #[inline]
    pub fn cell_count(&self) -> u32 {
        self.count_x * self.count_y * self.count_z
    }

    /// Near plane distance of the projection the cells were built for.
    #[inline]
    pub fn near(&self) -> f32 {
        self.near
    }

    /// Far plane distance of the projection the cells were built for.
    #[inline]
    pub fn far(&self) -> f32 {
        self.far
    }

    /// The multiplier and subtractor mapping `log2(depth)` to a slice.
    #[inline]
    pub fn slice_params(&self) -> (f32, f32) {
        (self.slice_multiplier, self.slice_subtractor)
    }

    /// Flat index of cell `(x, y, z)`.
    #[inline]
    pub fn cell_index(&self, x: u32, y: u32, z: u32) -> u32 {
        x + y * self.count_x + z * self.count_x * self.count_y
    }

    /// Cell `(x, y, z)`, valid after a rebuild.
    #[inline]
    pub fn cell(&self, x: u32, y: u32, z: u32) -> &ClusterCell {
        &self.cells[self.cell_index(x, y, z) as usize]
    }

    /// All cells in flat-index order.
    #[inline]
    pub fn cells(&self) -> &[ClusterCell] {
        &self.cells
    }

    /// The depth slice containing a positive view-space depth.
    #[inline]
    pub fn slice_of_depth(&self, depth: f32) -> u32 {
        let depth = depth.max(f32::MIN_POSITIVE);
        let slice = (depth.log2() * self.slice_multiplier - self.slice_subtractor).floor();
        slice.clamp(0.0, (self.count_z - 1) as f32) as u32
    }

    /// Rebuild cell volumes if the projection changed since the last call.
    /// Returns whether a rebuild happened.
    pub fn rebuild_if_changed(&mut self, projection: &Projection) -> bool {
        if self.signature == Some(projection.signature()) {
            return false;
        }
        self.rebuild(projection);
        true
    }

    /// Recompute every cell volume for a projection.
    pub fn rebuild(&mut self, projection: &Projection) {
        let near = projection.near;
        let far = projection.far;
        self.near = near;
        self.far = far;
        self.slice_multiplier = self.count_z as f32 / (far / near).log2();
        self.slice_subtractor = near.log2() * self.slice_multiplier;
        self.signature = Some(projection.signature());

        let inverse = projection.matrix.inverse();
        let ndc_depth_of = |depth: f32| {
            let clip = projection
                .matrix
                .transform_vector4(Vector4::new(0.0, 0.0, -depth, 1.0));
            clip.z / clip.w
        };

        self.cells.clear();
        self.cells
            .reserve(self.cell_count() as usize);

        for z in 0..self.count_z {
            let slice_near = near * (far / near).powf(z as f32 / self.count_z as f32);
            let slice_far = near * (far / near).powf((z + 1) as f32 / self.count_z as f32);
            let ndc_near = ndc_depth_of(slice_near);
            let ndc_far = ndc_depth_of(slice_far);

            for y in 0..self.count_y {
                let ndc_y0 = y as f32 / self.count_y as f32 * 2.0 - 1.0;
                let ndc_y1 = (y + 1) as f32 / self.count_y as f32 * 2.0 - 1.0;

                for x in 0..self.count_x {
                    let ndc_x0 = x as f32 / self.count_x as f32 * 2.0 - 1.0;
                    let ndc_x1 = (x + 1) as f32 / self.count_x as f32 * 2.0 - 1.0;

                    let mut corners = [crate::math::Vector3::ZERO; 8];
                    let mut i = 0;
                    for ndc_z in [ndc_near, ndc_far] {
                        for ndc_y in [ndc_y0, ndc_y1] {
                            for ndc_x in [ndc_x0, ndc_x1] {
                                corners[i] = inverse
                                    .transform_vector4(Vector4::new(ndc_x, ndc_y, ndc_z, 1.0))
                                    .to_point();
                                i += 1;
                            }
                        }
                    }

                    let bounds = Box3::from_points(&corners);
                    let sphere = Sphere::from_box3(&bounds);
                    self.cells.push(ClusterCell {
                        bounds,
                        center: sphere.center,
                        radius: sphere.radius,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;

    fn grid_for(near: f32, far: f32, count_z: u32) -> ClusterGrid {
        let mut camera = PerspectiveCamera::new(90.0, 1.0, near, far);
        let mut grid = ClusterGrid::new(16, 9, count_z);
        grid.rebuild(&camera.projection());
        grid
    }

    #[test]
    fn test_depth_slice_formula() {
        let grid = grid_for(0.1, 100.0, 24);
        assert_eq!(grid.slice_of_depth(0.1), 0);
        assert_eq!(grid.slice_of_depth(99.9), 23);
    }

    #[test]
    fn test_depth_slice_monotonic() {
        let grid = grid_for(0.1, 100.0, 24);
        let mut previous = 0;
        for i in 0..50 {
            let depth = 0.1 + (100.0 - 0.1) * i as f32 / 49.0;
            let slice = grid.slice_of_depth(depth.min(99.99));
            assert!(slice >= previous, "slice regressed at depth {depth}");
            assert!(slice < 24);
            previous = slice;
        }
    }

    #[test]
    fn test_depth_slice_clamps_outside_range() {
        let grid = grid_for(0.5, 50.0, 16);
        assert_eq!(grid.slice_of_depth(0.0), 0);
        assert_eq!(grid.slice_of_depth(0.01), 0);
        assert_eq!(grid.slice_of_depth(1000.0), 15);
    }

    #[test]
    fn test_rebuild_only_on_projection_change() {
        let mut camera = PerspectiveCamera::new(60.0, 1.5, 0.1, 200.0);
        let mut grid = ClusterGrid::new(8, 4, 8);

        assert!(grid.rebuild_if_changed(&camera.projection()));
        assert!(!grid.rebuild_if_changed(&camera.projection()));

        // Moving the camera does not invalidate, changing clip planes does.
        camera.set_position(crate::math::Vector3::new(5.0, 0.0, 0.0));
        assert!(!grid.rebuild_if_changed(&camera.projection()));
        camera.set_clip_planes(0.2, 200.0);
        assert!(grid.rebuild_if_changed(&camera.projection()));
    }

    #[test]
    fn test_cell_volumes_line_the_frustum() {
        let grid = grid_for(1.0, 100.0, 8);

        // Slice 0 starts at the near plane.
        let first = grid.cell(0, 0, 0);
        assert!((first.bounds.max.z + 1.0).abs() < 1e-3);

        // With a 90 degree square frustum the near corners sit at x = -z.
        assert!(first.bounds.min.x < 0.0);
        assert!((first.bounds.min.x + first.bounds.min.z.abs() * 1.0).abs() < 0.2);

        // The last slice reaches the far plane.
        let last = grid.cell(15, 8, 7);
        assert!((last.bounds.min.z + 100.0).abs() < 0.5);

        // Cells have positive volume and sane sphere bounds.
        for cell in grid.cells() {
            let size = cell.bounds.size();
            assert!(size.x > 0.0 && size.y > 0.0 && size.z > 0.0);
            assert!(cell.radius > 0.0);
        }
    }
}

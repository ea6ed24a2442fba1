//! Per-frame light-to-cluster assignment.

use super::{ClusterGrid, LightSet};
use crate::camera::Projection;
use crate::math::{Matrix4, Vector3, Vector4};
use rayon::prelude::*;

/// Where one light landed during the parallel sweep.
enum LightHits {
    /// Unbounded light, bound for the global list.
    Global(u32),
    /// Finite light touching these cluster cells.
    Cells(u32, Vec<u32>),
    /// Rejected before any cell test.
    None,
}

/// The result of assigning the light set to a cluster grid for one frame.
///
/// Rebuilt from scratch every time lights or camera state may have
/// changed; nothing here survives across frames.
pub struct LightAssignment {
    counts: Vec<u32>,
    indices: Vec<u32>,
    global: Vec<u32>,
    max_per_cluster: u32,
    dropped_cluster: u32,
    dropped_global: u32,
}

impl LightAssignment {
    /// Sweep every light against the grid.
    ///
    /// Lights are processed independently in parallel; the per-cell lists
    /// are then filled by a single merge pass in slot order, so the result
    /// is deterministic and cell capacity is enforced in one place.
    pub fn compute(
        set: &LightSet,
        grid: &ClusterGrid,
        view: &Matrix4,
        projection: &Projection,
        max_per_cluster: u32,
        max_global: u32,
    ) -> Self {
        let lights: Vec<(u32, &super::Light)> = set.iter().collect();

        let hits: Vec<LightHits> = lights
            .par_iter()
            .map(|&(slot, light)| {
                if light.is_global() {
                    LightHits::Global(slot)
                } else {
                    match gather_cells(light, grid, view, projection) {
                        Some(cells) => LightHits::Cells(slot, cells),
                        None => LightHits::None,
                    }
                }
            })
            .collect();

        let cell_count = grid.cell_count() as usize;
        let mut result = Self {
            counts: vec![0; cell_count],
            indices: vec![0; cell_count * max_per_cluster as usize],
            global: Vec::with_capacity(max_global as usize),
            max_per_cluster,
            dropped_cluster: 0,
            dropped_global: 0,
        };

        for hit in hits {
            match hit {
                LightHits::Global(slot) => {
                    if result.global.len() < max_global as usize {
                        result.global.push(slot);
                    } else {
                        // Past the cap the light is dropped for this frame.
                        result.dropped_global += 1;
                    }
                }
                LightHits::Cells(slot, cells) => {
                    for cell in cells {
                        let count = &mut result.counts[cell as usize];
                        if *count < max_per_cluster {
                            result.indices
                                [(cell * max_per_cluster + *count) as usize] = slot;
                            *count += 1;
                        } else {
                            result.dropped_cluster += 1;
                        }
                    }
                }
                LightHits::None => {}
            }
        }

        result
    }

    /// Light slots assigned to a cluster cell.
    pub fn cluster_lights(&self, cell: u32) -> &[u32] {
        let start = (cell * self.max_per_cluster) as usize;
        let count = self.counts[cell as usize] as usize;
        &self.indices[start..start + count]
    }

    /// The global light list, already clamped to its cap.
    #[inline]
    pub fn global_lights(&self) -> &[u32] {
        &self.global
    }

    /// Cell appends discarded because the cell was full.
    #[inline]
    pub fn dropped_cluster_lights(&self) -> u32 {
        self.dropped_cluster
    }

    /// Global lights discarded past the cap.
    #[inline]
    pub fn dropped_global_lights(&self) -> u32 {
        self.dropped_global
    }

    /// Pack the per-cluster table as `count, slot0, slot1, ..` per cell.
    pub fn pack_cluster_table(&self) -> Vec<u32> {
        let stride = 1 + self.max_per_cluster as usize;
        let mut table = vec![0u32; self.counts.len() * stride];
        for (cell, &count) in self.counts.iter().enumerate() {
            let dst = cell * stride;
            table[dst] = count;
            for i in 0..count as usize {
                table[dst + 1 + i] =
                    self.indices[cell * self.max_per_cluster as usize + i];
            }
        }
        table
    }

    /// Pack the global table as `count, slot0, slot1, ..`.
    pub fn pack_global_table(&self, max_global: u32) -> Vec<u32> {
        let mut table = vec![0u32; 1 + max_global as usize];
        table[0] = self.global.len() as u32;
        table[1..1 + self.global.len()].copy_from_slice(&self.global);
        table
    }
}

/// Find every cell a finite-range light can touch, or `None` when the
/// light cannot affect the frustum at all.
fn gather_cells(
    light: &super::Light,
    grid: &ClusterGrid,
    view: &Matrix4,
    projection: &Projection,
) -> Option<Vec<u32>> {
    let range = light.range;
    let view_pos = view.transform_point(&light.position);
    let vz = view_pos.z;

    // Depth rejection against the slab the grid occupies.
    if vz < -grid.far() - range || vz > -grid.near() + range {
        return None;
    }

    // Screen rejection: project the light's view-space bounding box. A
    // corner behind the eye makes the projected rect unbounded, in which
    // case every tile stays in play.
    let mut ndc_min = Vector3::splat(f32::INFINITY);
    let mut ndc_max = Vector3::splat(f32::NEG_INFINITY);
    let mut unbounded = false;
    for dx in [-range, range] {
        for dy in [-range, range] {
            for dz in [-range, range] {
                let corner = Vector4::new(
                    view_pos.x + dx,
                    view_pos.y + dy,
                    view_pos.z + dz,
                    1.0,
                );
                let clip = projection.matrix.transform_vector4(corner);
                if clip.w <= 0.0 {
                    unbounded = true;
                    continue;
                }
                let ndc = clip.to_point();
                ndc_min = ndc_min.min(&ndc);
                ndc_max = ndc_max.max(&ndc);
            }
        }
    }

    let (min_x, max_x, min_y, max_y) = if unbounded {
        (0, grid.count_x(), 0, grid.count_y())
    } else {
        if ndc_min.x > 1.0 || ndc_max.x < -1.0 || ndc_min.y > 1.0 || ndc_max.y < -1.0 {
            return None;
        }
        (
            tile_floor(ndc_min.x, grid.count_x()),
            tile_ceil(ndc_max.x, grid.count_x()),
            tile_floor(ndc_min.y, grid.count_y()),
            tile_ceil(ndc_max.y, grid.count_y()),
        )
    };

    let depth_near = (-vz - range).max(grid.near());
    let depth_far = (-vz + range).min(grid.far());
    let min_z = grid.slice_of_depth(depth_near);
    let max_z = grid.slice_of_depth(depth_far);

    let spot_axis = (light.kind == super::LightKind::Spot)
        .then(|| view.transform_direction(&light.direction).normalized());

    let mut cells = Vec::new();
    for z in min_z..=max_z {
        for y in min_y..max_y {
            for x in min_x..max_x {
                let cell = grid.cell(x, y, z);
                let touched = match spot_axis {
                    Some(axis) => cone_intersects_sphere(
                        &view_pos,
                        &axis,
                        range,
                        light.outer_angle,
                        &cell.center,
                        cell.radius,
                    ),
                    None => {
                        cell.bounds.squared_distance_to_point(&view_pos) <= range * range
                    }
                };
                if touched {
                    cells.push(grid.cell_index(x, y, z));
                }
            }
        }
    }

    Some(cells)
}

#[inline]
fn tile_floor(ndc: f32, count: u32) -> u32 {
    (((ndc * 0.5 + 0.5) * count as f32).floor() as i64).clamp(0, count as i64 - 1) as u32
}

#[inline]
fn tile_ceil(ndc: f32, count: u32) -> u32 {
    (((ndc * 0.5 + 0.5) * count as f32).ceil() as i64).clamp(1, count as i64) as u32
}

/// Cone against sphere, using the closest-point distance along and around
/// the cone axis.
fn cone_intersects_sphere(
    apex: &Vector3,
    axis: &Vector3,
    range: f32,
    outer_angle: f32,
    center: &Vector3,
    radius: f32,
) -> bool {
    let v = *center - *apex;
    let v_len_sq = v.dot(&v);
    let along = v.dot(axis);

    let ortho = (v_len_sq - along * along).max(0.0).sqrt();
    let closest = ortho * outer_angle.cos() - along * outer_angle.sin();

    let angle_cull = closest > radius;
    let front_cull = along > radius + range;
    let back_cull = along < -radius;
    !(angle_cull || front_cull || back_cull)
}

/// GPU lookup buffers produced by light assignment: a cluster table indexed
/// by cluster id, the global list, and the flat light-parameter array
/// indexed by light slot.
pub struct ClusterLightBuffers {
    cluster_table: wgpu::Buffer,
    global_table: wgpu::Buffer,
    light_params: wgpu::Buffer,
    params_capacity: u32,
    max_global: u32,
}

impl ClusterLightBuffers {
    /// Create the lookup buffers for a grid of `cell_count` cells.
    pub fn new(
        device: &wgpu::Device,
        cell_count: u32,
        max_per_cluster: u32,
        max_global: u32,
    ) -> Self {
        let params_capacity = 64;
        Self {
            cluster_table: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Cluster Light Table Buffer"),
                size: cell_count as u64 * (1 + max_per_cluster) as u64 * 4,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            global_table: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Global Light Table Buffer"),
                size: (1 + max_global) as u64 * 4,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            light_params: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Light Params Buffer"),
                size: params_capacity as u64 * std::mem::size_of::<super::LightParams>() as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            params_capacity,
            max_global,
        }
    }

    /// Upload an assignment and the packed light parameters.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        assignment: &LightAssignment,
        set: &LightSet,
    ) {
        queue.write_buffer(
            &self.cluster_table,
            0,
            bytemuck::cast_slice(&assignment.pack_cluster_table()),
        );
        queue.write_buffer(
            &self.global_table,
            0,
            bytemuck::cast_slice(&assignment.pack_global_table(self.max_global)),
        );

        let params = set.pack_params();
        if params.len() as u32 > self.params_capacity {
            while self.params_capacity < params.len() as u32 {
                self.params_capacity *= 2;
            }
            self.light_params = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Light Params Buffer"),
                size: self.params_capacity as u64
                    * std::mem::size_of::<super::LightParams>() as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
        }
        if !params.is_empty() {
            queue.write_buffer(&self.light_params, 0, bytemuck::cast_slice(&params));
        }
    }

    /// The per-cluster lookup buffer.
    #[inline]
    pub fn cluster_table(&self) -> &wgpu::Buffer {
        &self.cluster_table
    }

    /// The global light list buffer.
    #[inline]
    pub fn global_table(&self) -> &wgpu::Buffer {
        &self.global_table
    }

    /// The flat light-parameter buffer.
    #[inline]
    pub fn light_params(&self) -> &wgpu::Buffer {
        &self.light_params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::lights::{Light, LightKind, LightSet};

    fn directional() -> Light {
        Light {
            kind: LightKind::Directional,
            position: Vector3::ZERO,
            direction: Vector3::new(0.0, -1.0, 0.0),
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            range: 0.0,
            outer_angle: 0.0,
            inner_angle: 0.0,
        }
    }

    fn point_at(position: Vector3, range: f32) -> Light {
        Light {
            kind: LightKind::Point,
            position,
            direction: Vector3::new(0.0, -1.0, 0.0),
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            range,
            outer_angle: 0.0,
            inner_angle: 0.0,
        }
    }

    fn scene(count: (u32, u32, u32)) -> (ClusterGrid, Matrix4, Projection) {
        let mut camera = PerspectiveCamera::new(90.0, 1.0, 0.5, 50.0);
        let projection = camera.projection();
        let view = camera.view_matrix();
        let mut grid = ClusterGrid::new(count.0, count.1, count.2);
        grid.rebuild(&projection);
        (grid, view, projection)
    }

    #[test]
    fn test_global_light_cap() {
        let (grid, view, projection) = scene((8, 8, 8));
        let mut set = LightSet::new();
        for _ in 0..3 {
            set.add(directional());
        }

        let assignment = LightAssignment::compute(&set, &grid, &view, &projection, 8, 2);
        assert_eq!(assignment.global_lights().len(), 2);
        assert_eq!(assignment.global_lights(), &[0, 1]);
        assert_eq!(assignment.dropped_global_lights(), 1);
    }

    #[test]
    fn test_cluster_coverage() {
        let (grid, view, projection) = scene((8, 8, 8));
        let mut set = LightSet::new();
        // The camera sits at (0, 0, 5) looking at the origin, so world
        // (0, 0, 0) is view (0, 0, -5): safely inside the frustum.
        let slot = set.add(point_at(Vector3::ZERO, 2.0));

        let assignment = LightAssignment::compute(&set, &grid, &view, &projection, 32, 2);

        let light_view = view.transform_point(&Vector3::ZERO);
        let mut touched = 0;
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    let index = grid.cell_index(x, y, z);
                    let cell = grid.cell(x, y, z);
                    let intersects =
                        cell.bounds.squared_distance_to_point(&light_view) <= 4.0;
                    let listed = assignment.cluster_lights(index).contains(&slot);
                    if intersects {
                        assert!(listed, "cell ({x},{y},{z}) intersects but lacks the light");
                        touched += 1;
                    } else {
                        assert!(!listed, "cell ({x},{y},{z}) listed without intersecting");
                    }
                }
            }
        }
        assert!(touched > 0, "light inside the frustum touched no cell");
    }

    #[test]
    fn test_cell_capacity_drops_keep_slot_order() {
        let (grid, view, projection) = scene((4, 4, 4));
        let mut set = LightSet::new();
        let first = set.add(point_at(Vector3::ZERO, 3.0));
        let second = set.add(point_at(Vector3::new(0.1, 0.0, 0.0), 3.0));

        let assignment = LightAssignment::compute(&set, &grid, &view, &projection, 1, 2);
        assert!(assignment.dropped_cluster_lights() > 0);

        for cell in 0..grid.cell_count() {
            let lights = assignment.cluster_lights(cell);
            assert!(lights.len() <= 1);
            // The merge runs in slot order, so a full cell kept the first.
            if !lights.is_empty() && assignment.dropped_cluster_lights() > 0 {
                assert!(lights[0] == first || lights[0] == second);
            }
        }
    }

    #[test]
    fn test_depth_rejection() {
        let (grid, view, projection) = scene((8, 8, 8));
        let mut set = LightSet::new();
        // Behind the camera at world z = 10 (camera sits at z = 5).
        set.add(point_at(Vector3::new(0.0, 0.0, 10.0), 1.0));
        // Beyond the far plane.
        set.add(point_at(Vector3::new(0.0, 0.0, -60.0), 1.0));

        let assignment = LightAssignment::compute(&set, &grid, &view, &projection, 8, 2);
        for cell in 0..grid.cell_count() {
            assert!(assignment.cluster_lights(cell).is_empty());
        }
    }

    #[test]
    fn test_spot_cone_is_narrower_than_sphere() {
        let (grid, view, projection) = scene((8, 8, 8));

        let spot = Light {
            kind: LightKind::Spot,
            position: Vector3::ZERO,
            // World -z: straight ahead for a camera at (0, 0, 5) facing the
            // origin.
            direction: Vector3::new(0.0, 0.0, -1.0),
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            range: 20.0,
            outer_angle: 0.3,
            inner_angle: 0.2,
        };
        let mut spot_set = LightSet::new();
        let slot = spot_set.add(spot.clone());

        let mut point_set = LightSet::new();
        point_set.add(point_at(spot.position, spot.range));

        let spots = LightAssignment::compute(&spot_set, &grid, &view, &projection, 32, 2);
        let points = LightAssignment::compute(&point_set, &grid, &view, &projection, 32, 2);

        let cell_containing = |p: Vector3| -> u32 {
            (0..grid.cell_count())
                .find(|&c| {
                    let b = grid.cells()[c as usize].bounds;
                    p.x >= b.min.x && p.x <= b.max.x
                        && p.y >= b.min.y && p.y <= b.max.y
                        && p.z >= b.min.z && p.z <= b.max.z
                })
                .expect("point lies in the frustum")
        };

        // A view-space point down the cone axis is lit by both.
        let on_axis = cell_containing(Vector3::new(0.1, 0.1, -9.7));
        assert!(spots.cluster_lights(on_axis).contains(&slot));
        assert!(points.cluster_lights(on_axis).contains(&0));

        // Well off-axis but within range: the sphere reaches it, the cone
        // does not.
        let off_axis = cell_containing(Vector3::new(4.0, 0.1, -6.3));
        assert!(!spots.cluster_lights(off_axis).contains(&slot));
        assert!(points.cluster_lights(off_axis).contains(&0));

        let spot_cells = (0..grid.cell_count())
            .filter(|&c| spots.cluster_lights(c).contains(&slot))
            .count();
        let point_cells = (0..grid.cell_count())
            .filter(|&c| points.cluster_lights(c).contains(&0))
            .count();
        assert!(spot_cells > 0);
        assert!(spot_cells < point_cells);
    }

    #[test]
    fn test_pack_tables() {
        let (grid, view, projection) = scene((4, 4, 4));
        let mut set = LightSet::new();
        set.add(directional());
        set.add(point_at(Vector3::ZERO, 2.0));

        let assignment = LightAssignment::compute(&set, &grid, &view, &projection, 4, 2);

        let table = assignment.pack_cluster_table();
        assert_eq!(table.len(), (grid.cell_count() * 5) as usize);
        for cell in 0..grid.cell_count() {
            let base = (cell * 5) as usize;
            assert_eq!(table[base], assignment.cluster_lights(cell).len() as u32);
        }

        let global = assignment.pack_global_table(2);
        assert_eq!(global, vec![1, 0, 0]);
    }
}

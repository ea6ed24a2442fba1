//! The two-phase cull-then-draw frame pipeline.

use super::draw::{DrawStage, FrameTargets, FrameUniform, ResolvedDraw};
use super::{BlendMode, FrameInfo, OitTargets};
use crate::camera::Projection;
use crate::core::{Context, Id};
use crate::culling::{CullPhase, CullStage, HzbPyramid, OccluderDraw, SurvivorCount};
use crate::instances::{InstanceAllocator, MeshBuffers};
use crate::lights::{ClusterGrid, ClusterLightBuffers};
use crate::math::{Matrix4, Vector3};
use std::collections::HashMap;

/// The camera inputs a frame is rendered with.
pub struct CameraState {
    /// View matrix.
    pub view: Matrix4,
    /// Projection snapshot.
    pub projection: Projection,
    /// Camera world position, for shading.
    pub position: Vector3,
}

/// One mesh the scene wants drawn this frame.
pub struct DrawItem<'a> {
    /// The mesh's instance table key.
    pub mesh: Id,
    /// The mesh's geometry buffers.
    pub buffers: MeshBuffers<'a>,
    /// Material blend classification.
    pub mode: BlendMode,
    /// Material base color.
    pub color: [f32; 4],
}

/// A mesh whose culling pass has been recorded but whose survivor count
/// has not been read yet.
pub struct PendingDraw {
    /// The culled mesh.
    pub mesh: Id,
    /// The pending GPU count.
    pub survivors: SurvivorCount,
}

/// Drives a camera's frame through the fixed pass order: occluder culls,
/// occluder depth, Hi-Z build, main culls, then draws.
///
/// Culling and drawing are separate phases with the pending survivor
/// counts carried between them as values, so a draw cannot be recorded
/// before the culls it depends on are submitted.
pub struct FramePlan {
    frame: u64,
}

impl Default for FramePlan {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePlan {
    /// Create the plan. One instance serves the lifetime of a camera.
    pub fn new() -> Self {
        Self { frame: 0 }
    }

    /// Phase one: record and submit every culling pass for the frame.
    ///
    /// Occluder meshes are culled against the frustum and drawn into the
    /// Hi-Z base level, the pyramid is reduced, and every mesh is then
    /// culled against frustum plus pyramid. Returns the pending survivor
    /// counts for phase two.
    pub fn submit_visibility(
        &mut self,
        ctx: &Context,
        cull: &mut CullStage,
        hzb: &HzbPyramid,
        allocator: &InstanceAllocator,
        camera: &CameraState,
        items: &[DrawItem<'_>],
    ) -> Vec<PendingDraw> {
        // Occluder pre-pass culls, one submission so the counts can drain
        // while the depth pass is being recorded.
        let mut encoder = ctx.create_command_encoder();
        let mut occluder_pending = Vec::new();
        for item in items {
            let Some(entry) = allocator.entry(item.mesh) else {
                continue;
            };
            if !entry.source.occluder {
                continue;
            }
            let survivors = cull.record_cull(
                &ctx.device,
                &ctx.queue,
                &mut encoder,
                item.mesh,
                entry,
                &camera.view,
                &camera.projection,
                hzb,
                CullPhase::Occluder,
            );
            occluder_pending.push((item.mesh, item.buffers, survivors));
        }
        ctx.submit(std::iter::once(encoder.finish()));

        let occluder_draws: Vec<OccluderDraw<'_>> = occluder_pending
            .into_iter()
            .filter_map(|(mesh, buffers, mut survivors)| {
                let entry = allocator.entry(mesh)?;
                let compacted = cull.compacted_buffer(mesh)?.clone();
                Some(OccluderDraw {
                    buffers,
                    compacted,
                    index_count: entry.source.index_count,
                    instance_count: survivors.resolve(&ctx.device),
                })
            })
            .collect();

        // Depth, pyramid, and main culls land in one submission; the
        // encoder order keeps them sequenced on the GPU.
        let view_proj = camera.projection.matrix.multiply(&camera.view);
        let mut encoder = ctx.create_command_encoder();
        hzb.record_depth_pass(&ctx.device, &ctx.queue, &mut encoder, &view_proj, &occluder_draws);
        drop(occluder_draws);
        hzb.record_build(&mut encoder);

        let mut pending = Vec::new();
        for item in items {
            let Some(entry) = allocator.entry(item.mesh) else {
                log::warn!("draw item references mesh {} with no instances", item.mesh);
                continue;
            };
            let survivors = cull.record_cull(
                &ctx.device,
                &ctx.queue,
                &mut encoder,
                item.mesh,
                entry,
                &camera.view,
                &camera.projection,
                hzb,
                CullPhase::Main,
            );
            pending.push(PendingDraw {
                mesh: item.mesh,
                survivors,
            });
        }
        ctx.submit(std::iter::once(encoder.finish()));

        pending
    }

    /// Phase two: resolve every pending count, then record and submit the
    /// draw passes.
    ///
    /// Resolving blocks per counter at worst; because phase one already
    /// submitted all culls, the GPU has been working through them since.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_draws(
        &mut self,
        ctx: &Context,
        cull: &CullStage,
        draw: &mut DrawStage,
        oit: &OitTargets,
        lights: &ClusterLightBuffers,
        grid: &ClusterGrid,
        max_lights_per_cluster: u32,
        allocator: &InstanceAllocator,
        camera: &CameraState,
        items: &[DrawItem<'_>],
        pending: Vec<PendingDraw>,
        targets: &FrameTargets<'_>,
    ) -> FrameInfo {
        self.frame += 1;

        let mut survivors_by_mesh: HashMap<Id, u32> = HashMap::with_capacity(pending.len());
        for mut p in pending {
            survivors_by_mesh.insert(p.mesh, p.survivors.resolve(&ctx.device));
        }

        let (multiplier, subtractor) = grid.slice_params();
        draw.write_frame_uniform(
            &ctx.queue,
            &FrameUniform {
                view: camera.view.to_cols_array_2d(),
                proj: camera.projection.matrix.to_cols_array_2d(),
                camera_pos: [camera.position.x, camera.position.y, camera.position.z, 1.0],
                cluster_counts: [
                    grid.count_x(),
                    grid.count_y(),
                    grid.count_z(),
                    max_lights_per_cluster,
                ],
                slice_params: [multiplier, subtractor, grid.near(), grid.far()],
                viewport: [targets.width as f32, targets.height as f32, 0.0, 0.0],
            },
        );

        let mut info = FrameInfo {
            frame: self.frame,
            ..FrameInfo::default()
        };

        let mut draws = Vec::with_capacity(items.len());
        for item in items {
            let Some(entry) = allocator.entry(item.mesh) else {
                continue;
            };
            let Some(&instance_count) = survivors_by_mesh.get(&item.mesh) else {
                continue;
            };
            let Some(compacted) = cull.compacted_buffer(item.mesh) else {
                continue;
            };

            info.instances_culled += entry.table.live_count().saturating_sub(instance_count);
            if instance_count == 0 {
                info.meshes_skipped += 1;
            }

            draws.push(ResolvedDraw {
                mesh: item.mesh,
                buffers: item.buffers,
                mode: item.mode,
                color: item.color,
                index_count: entry.source.index_count,
                instance_count,
                compacted: compacted.clone(),
            });
        }

        let mut encoder = ctx.create_command_encoder();
        let (draw_calls, instances_drawn) =
            draw.record_draws(&ctx.device, &ctx.queue, &mut encoder, targets, oit, lights, &draws);
        ctx.submit(std::iter::once(encoder.finish()));

        info.draw_calls = draw_calls;
        info.instances_drawn = instances_drawn;
        info
    }
}

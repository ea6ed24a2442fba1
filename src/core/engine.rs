//! The engine facade wiring the visibility and lighting stages together.

use super::{Config, Context, Id};
use crate::culling::{CullStage, HzbPyramid};
use crate::frame::{CameraState, DrawItem, DrawStage, FrameInfo, FramePlan, FrameTargets, OitTargets};
use crate::instances::{InstanceAllocator, InstanceSlot, MeshSource};
use crate::lights::{ClusterGrid, ClusterLightBuffers, Light, LightAssignment, LightSet};
use crate::math::Matrix4;

/// Owns every stage of the visibility and lighting core for one camera and
/// runs them in the required order each frame.
///
/// The stages are public so an embedding renderer can drive them
/// individually; [`Engine::render_frame`] is the straight path.
pub struct Engine {
    /// Configuration the stages were created from.
    pub config: Config,
    /// GPU device and queue.
    pub context: Context,
    /// Per-mesh instance tables.
    pub allocator: InstanceAllocator,
    /// GPU culling stage.
    pub cull: CullStage,
    /// Occluder depth and Hi-Z pyramid.
    pub hzb: HzbPyramid,
    /// View-frustum cluster grid.
    pub grid: ClusterGrid,
    /// Registered lights.
    pub lights: LightSet,
    /// GPU lookup buffers for clustered shading.
    pub light_buffers: ClusterLightBuffers,
    /// Draw pipelines.
    pub draw: DrawStage,
    /// Weighted-transparency targets.
    pub oit: OitTargets,
    /// The two-phase frame pipeline.
    pub plan: FramePlan,
}

impl Engine {
    /// Create every stage from a context and configuration.
    pub fn new(context: Context, config: Config, width: u32, height: u32) -> Self {
        let allocator = InstanceAllocator::new(config.initial_instance_capacity);
        let cull = CullStage::new(&context.device);
        let hzb = HzbPyramid::new(&context.device, config.hzb_resolution);
        let grid = ClusterGrid::new(
            config.cluster_count_x,
            config.cluster_count_y,
            config.cluster_count_z,
        );
        let light_buffers = ClusterLightBuffers::new(
            &context.device,
            config.cluster_count(),
            config.max_lights_per_cluster,
            config.max_global_lights,
        );
        let draw = DrawStage::new(&context.device, context.color_format, context.depth_format);
        let oit = OitTargets::new(&context.device, context.color_format, width, height);

        Self {
            config,
            context,
            allocator,
            cull,
            hzb,
            grid,
            lights: LightSet::new(),
            light_buffers,
            draw,
            oit,
            plan: FramePlan::new(),
        }
    }

    /// Attach a renderable occurrence of a mesh.
    pub fn attach(
        &mut self,
        mesh: Id,
        source: &MeshSource,
        owner: Id,
        world: &Matrix4,
    ) -> InstanceSlot {
        self.allocator
            .attach(&self.context.device, &self.context.queue, mesh, source, owner, world)
    }

    /// Detach a renderable. A bad handle is a caller bookkeeping bug; it is
    /// logged and the frame goes on.
    pub fn detach(&mut self, mesh: Id, owner: Id, slot: InstanceSlot) {
        if let Err(err) = self.allocator.detach(&self.context.queue, mesh, owner, slot) {
            log::error!("detach ignored: {err}");
        }
    }

    /// Move a live instance.
    pub fn set_transform(&mut self, mesh: Id, owner: Id, slot: InstanceSlot, world: &Matrix4) {
        if let Err(err) =
            self.allocator
                .write_transform(&self.context.queue, mesh, owner, slot, world)
        {
            log::error!("transform update ignored: {err}");
        }
    }

    /// Tear down everything held for an unloaded mesh.
    pub fn remove_mesh(&mut self, mesh: Id) {
        if let Err(err) = self.allocator.remove_mesh(mesh) {
            log::error!("mesh removal ignored: {err}");
            return;
        }
        self.cull.remove_mesh(mesh);
        self.draw.remove_mesh(mesh);
    }

    /// Register a light, returning its stable slot.
    pub fn add_light(&mut self, light: Light) -> u32 {
        self.lights.add(light)
    }

    /// Release a light slot. A bad slot is logged and the frame goes on.
    pub fn remove_light(&mut self, slot: u32) {
        if let Err(err) = self.lights.remove(slot) {
            log::error!("light removal ignored: {err}");
        }
    }

    /// Resize the viewport-sized targets.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.oit.resize(&self.context.device, width, height);
    }

    /// Render one frame in the required order: cull everything, rebuild
    /// the grid if the projection changed, assign lights, then resolve
    /// survivor counts and draw.
    pub fn render_frame(
        &mut self,
        camera: &CameraState,
        items: &[DrawItem<'_>],
        targets: &FrameTargets<'_>,
    ) -> FrameInfo {
        let pending = self.plan.submit_visibility(
            &self.context,
            &mut self.cull,
            &self.hzb,
            &self.allocator,
            camera,
            items,
        );

        self.grid.rebuild_if_changed(&camera.projection);
        let assignment = LightAssignment::compute(
            &self.lights,
            &self.grid,
            &camera.view,
            &camera.projection,
            self.config.max_lights_per_cluster,
            self.config.max_global_lights,
        );
        self.light_buffers.upload(
            &self.context.device,
            &self.context.queue,
            &assignment,
            &self.lights,
        );

        self.plan.submit_draws(
            &self.context,
            &self.cull,
            &mut self.draw,
            &self.oit,
            &self.light_buffers,
            &self.grid,
            self.config.max_lights_per_cluster,
            &self.allocator,
            camera,
            items,
            pending,
            targets,
        )
    }
}

//! Per-mesh GPU culling with stream compaction.

use super::{HzbPyramid, SurvivorCount};
use crate::camera::Projection;
use crate::core::Id;
use crate::instances::{InstanceData, MeshEntry};
use crate::math::{Frustum, Matrix4};
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;
use std::sync::Arc;

/// Which pass of the two-phase scheme a cull dispatch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullPhase {
    /// Pre-pass over occluder meshes; frustum test only.
    Occluder,
    /// Main pass; frustum plus Hi-Z occlusion for non-occluder meshes.
    Main,
}

/// Culling parameters for one mesh dispatch (272 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CullUniform {
    /// World-space frustum planes as `xyz = normal, w = constant`.
    planes: [[f32; 4]; 6],
    /// View matrix.
    view: [[f32; 4]; 4],
    /// Projection matrix.
    proj: [[f32; 4]; 4],
    /// Object-space bounding sphere, `xyz = center, w = radius`.
    bounds: [f32; 4],
    /// `near, far, proj[0][0], proj[1][1]`.
    depth_params: [f32; 4],
    /// `x = slots to scan, y = occlusion test flag, z = hzb mips, w = hzb size`.
    counts: [u32; 4],
}

struct MeshCullResources {
    uniform: wgpu::Buffer,
    compacted: Arc<wgpu::Buffer>,
    counter: wgpu::Buffer,
    staging: Arc<wgpu::Buffer>,
    capacity: u32,
}

impl MeshCullResources {
    fn new(device: &wgpu::Device, capacity: u32) -> Self {
        Self {
            uniform: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Cull Uniform Buffer"),
                size: std::mem::size_of::<CullUniform>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            compacted: Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Compacted Instance Buffer"),
                size: capacity as u64 * std::mem::size_of::<InstanceData>() as u64,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            })),
            counter: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Survivor Counter Buffer"),
                size: std::mem::size_of::<u32>() as u64,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            staging: Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Survivor Counter Staging Buffer"),
                size: std::mem::size_of::<u32>() as u64,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })),
            capacity,
        }
    }
}

/// Streams instance tables through the culling program, compacting
/// survivors per mesh.
pub struct CullStage {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    resources: HashMap<Id, MeshCullResources>,
}

impl CullStage {
    /// Create the culling pipeline.
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Instance Cull Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/instance_cull.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Instance Cull Bind Group Layout"),
            entries: &[
                // Cull uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Instance table (read)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Compacted survivors (write)
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Survivor counter (atomic)
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Hi-Z pyramid
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Instance Cull Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Instance Cull Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
            resources: HashMap::new(),
        }
    }

    /// The compacted survivor buffer for a mesh, once it has been culled.
    pub fn compacted_buffer(&self, mesh: Id) -> Option<&Arc<wgpu::Buffer>> {
        self.resources.get(&mesh).map(|r| &r.compacted)
    }

    /// Drop the culling resources of an unloaded mesh.
    pub fn remove_mesh(&mut self, mesh: Id) {
        self.resources.remove(&mesh);
    }

    /// Record the culling dispatch for one mesh and hand back the pending
    /// survivor count.
    ///
    /// The output buffer is (re)sized to the table's current capacity, so a
    /// table that grew since the last frame relinks here automatically.
    #[allow(clippy::too_many_arguments)]
    pub fn record_cull(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        mesh: Id,
        entry: &MeshEntry,
        view: &Matrix4,
        projection: &Projection,
        hzb: &HzbPyramid,
        phase: CullPhase,
    ) -> SurvivorCount {
        let capacity = entry.table.capacity();
        let resources = self
            .resources
            .entry(mesh)
            .or_insert_with(|| MeshCullResources::new(device, capacity));
        if resources.capacity != capacity {
            *resources = MeshCullResources::new(device, capacity);
        }

        let view_proj = projection.matrix.multiply(view);
        let frustum = Frustum::from_matrix(&view_proj);
        let test_occlusion = phase == CullPhase::Main && !entry.source.occluder;
        let scan_count = entry
            .table
            .max_instance_index()
            .saturating_add(1)
            .min(capacity);

        let uniform = CullUniform {
            planes: frustum.to_gpu_planes(),
            view: view.to_cols_array_2d(),
            proj: projection.matrix.to_cols_array_2d(),
            bounds: [
                entry.source.bounds.center.x,
                entry.source.bounds.center.y,
                entry.source.bounds.center.z,
                entry.source.bounds.radius,
            ],
            depth_params: [
                projection.near,
                projection.far,
                projection.matrix.elements[0],
                projection.matrix.elements[5],
            ],
            counts: [
                scan_count,
                test_occlusion as u32,
                hzb.mip_count(),
                hzb.size(),
            ],
        };
        queue.write_buffer(&resources.uniform, 0, bytemuck::bytes_of(&uniform));
        queue.write_buffer(&resources.counter, 0, bytemuck::bytes_of(&0u32));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Instance Cull Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: resources.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: entry.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.compacted.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: resources.counter.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(hzb.pyramid_view()),
                },
            ],
        });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Instance Cull Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(scan_count.div_ceil(64), 1, 1);
        }

        encoder.copy_buffer_to_buffer(
            &resources.counter,
            0,
            &resources.staging,
            0,
            std::mem::size_of::<u32>() as u64,
        );

        SurvivorCount::new(resources.staging.clone())
    }
}

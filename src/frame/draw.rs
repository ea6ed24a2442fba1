//! Instanced draw pipelines over compacted survivor buffers.

use super::{BlendMode, OitTargets, RenderStream};
use crate::core::Id;
use crate::instances::{MeshBuffers, Vertex};
use crate::lights::ClusterLightBuffers;
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;
use std::sync::Arc;

/// Frame-wide shading parameters (192 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct FrameUniform {
    /// View matrix.
    pub view: [[f32; 4]; 4],
    /// Projection matrix.
    pub proj: [[f32; 4]; 4],
    /// Camera world position.
    pub camera_pos: [f32; 4],
    /// `count_x, count_y, count_z, max_lights_per_cluster`.
    pub cluster_counts: [u32; 4],
    /// `slice multiplier, slice subtractor, near, far`.
    pub slice_params: [f32; 4],
    /// Viewport `width, height` in pixels.
    pub viewport: [f32; 4],
}

/// Per-mesh material parameters (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MaterialParams {
    /// Base color, alpha included.
    color: [f32; 4],
    /// `cutoff threshold, mode id, 0, 0`.
    params: [f32; 4],
}

/// The camera-facing render targets for one frame.
pub struct FrameTargets<'a> {
    /// Color target the forward and composite passes write.
    pub color: &'a wgpu::TextureView,
    /// Depth target shared by opaque, blended, and transparent passes.
    pub depth: &'a wgpu::TextureView,
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
}

/// One mesh ready to draw: culled, counted, and classified.
pub(crate) struct ResolvedDraw<'a> {
    pub mesh: Id,
    pub buffers: MeshBuffers<'a>,
    pub mode: BlendMode,
    pub color: [f32; 4],
    pub index_count: u32,
    pub instance_count: u32,
    pub compacted: Arc<wgpu::Buffer>,
}

/// Issues per-mesh instanced draws from survivor counts and compacted
/// instance buffers.
pub struct DrawStage {
    frame_uniform: wgpu::Buffer,
    scene_bind_group_layout: wgpu::BindGroupLayout,
    mesh_bind_group_layout: wgpu::BindGroupLayout,
    opaque_pipeline: wgpu::RenderPipeline,
    additive_pipeline: wgpu::RenderPipeline,
    multiplicative_pipeline: wgpu::RenderPipeline,
    oit_pipeline: wgpu::RenderPipeline,
    materials: HashMap<Id, wgpu::Buffer>,
}

impl DrawStage {
    /// Create the draw pipelines for the given target formats.
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Forward Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/forward.wgsl").into()),
        });

        let scene_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Forward Scene Bind Group Layout"),
                entries: &[
                    // Frame uniform
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Light parameters by slot
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Per-cluster light table
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Global light table
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let mesh_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Forward Mesh Bind Group Layout"),
                entries: &[
                    // Compacted instances
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Material
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Forward Pipeline Layout"),
            bind_group_layouts: &[&scene_bind_group_layout, &mesh_bind_group_layout],
            push_constant_ranges: &[],
        });

        let forward_pipeline = |label: &str,
                                blend: Option<wgpu::BlendState>,
                                depth_write: bool|
         -> wgpu::RenderPipeline {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[Vertex::layout()],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: depth_format,
                    depth_write_enabled: depth_write,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: color_format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        };

        let opaque_pipeline = forward_pipeline("Forward Opaque Pipeline", None, true);
        let additive_pipeline = forward_pipeline(
            "Forward Additive Pipeline",
            Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent::OVER,
            }),
            false,
        );
        let multiplicative_pipeline = forward_pipeline(
            "Forward Multiplicative Pipeline",
            Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Dst,
                    dst_factor: wgpu::BlendFactor::Zero,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent::OVER,
            }),
            false,
        );

        let oit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Forward OIT Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[Vertex::layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_format,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_oit"),
                compilation_options: Default::default(),
                targets: &[
                    // Accumulation: plain additive in every channel.
                    Some(wgpu::ColorTargetState {
                        format: super::oit::ACCUM_FORMAT,
                        blend: Some(wgpu::BlendState {
                            color: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::One,
                                dst_factor: wgpu::BlendFactor::One,
                                operation: wgpu::BlendOperation::Add,
                            },
                            alpha: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::One,
                                dst_factor: wgpu::BlendFactor::One,
                                operation: wgpu::BlendOperation::Add,
                            },
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                    // Reveal: multiply the running product by 1 - alpha.
                    Some(wgpu::ColorTargetState {
                        format: super::oit::REVEAL_FORMAT,
                        blend: Some(wgpu::BlendState {
                            color: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::Zero,
                                dst_factor: wgpu::BlendFactor::OneMinusSrc,
                                operation: wgpu::BlendOperation::Add,
                            },
                            alpha: wgpu::BlendComponent::REPLACE,
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                ],
            }),
            multiview: None,
            cache: None,
        });

        let frame_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniform Buffer"),
            size: std::mem::size_of::<FrameUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            frame_uniform,
            scene_bind_group_layout,
            mesh_bind_group_layout,
            opaque_pipeline,
            additive_pipeline,
            multiplicative_pipeline,
            oit_pipeline,
            materials: HashMap::new(),
        }
    }

    /// Drop the material parameters of an unloaded mesh.
    pub fn remove_mesh(&mut self, mesh: Id) {
        self.materials.remove(&mesh);
    }

    pub(crate) fn write_frame_uniform(&self, queue: &wgpu::Queue, uniform: &FrameUniform) {
        queue.write_buffer(&self.frame_uniform, 0, bytemuck::bytes_of(uniform));
    }

    /// Record all draw passes for one frame's resolved survivors. Returns
    /// `(draw calls, instances drawn)`.
    pub(crate) fn record_draws(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        targets: &FrameTargets<'_>,
        oit: &OitTargets,
        lights: &ClusterLightBuffers,
        draws: &[ResolvedDraw<'_>],
    ) -> (u32, u32) {
        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Forward Scene Bind Group"),
            layout: &self.scene_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.frame_uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights.light_params().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: lights.cluster_table().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: lights.global_table().as_entire_binding(),
                },
            ],
        });

        let mut mesh_bind_groups = Vec::with_capacity(draws.len());
        for draw in draws {
            let material = self.materials.entry(draw.mesh).or_insert_with(|| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Material Params Buffer"),
                    size: std::mem::size_of::<MaterialParams>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            });
            let params = MaterialParams {
                color: draw.color,
                params: [
                    0.5,
                    match draw.mode {
                        BlendMode::Cutoff => 1.0,
                        _ => 0.0,
                    },
                    0.0,
                    0.0,
                ],
            };
            queue.write_buffer(material, 0, bytemuck::bytes_of(&params));

            mesh_bind_groups.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Forward Mesh Bind Group"),
                layout: &self.mesh_bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: draw.compacted.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: material.as_entire_binding(),
                    },
                ],
            }));
        }

        let mut stats = (0u32, 0u32);

        // Opaque and blended streams into the main targets.
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Forward Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: targets.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_bind_group(0, &scene_bind_group, &[]);

            pass.set_pipeline(&self.opaque_pipeline);
            for (i, draw) in draws.iter().enumerate() {
                if draw.instance_count > 0 && draw.mode.stream() == RenderStream::Culled {
                    issue_draw(&mut pass, draw, &mesh_bind_groups[i], &mut stats);
                }
            }

            for (pipeline, mode) in [
                (&self.additive_pipeline, BlendMode::Additive),
                (&self.multiplicative_pipeline, BlendMode::Multiplicative),
            ] {
                if draws.iter().any(|d| d.mode == mode && d.instance_count > 0) {
                    pass.set_pipeline(pipeline);
                    for (i, draw) in draws.iter().enumerate() {
                        if draw.instance_count > 0 && draw.mode == mode {
                            issue_draw(&mut pass, draw, &mesh_bind_groups[i], &mut stats);
                        }
                    }
                }
            }
        }

        // Transparent stream into the accumulation targets.
        let transparent: Vec<usize> = draws
            .iter()
            .enumerate()
            .filter(|(_, d)| {
                d.instance_count > 0 && d.mode.stream() == RenderStream::Transparent
            })
            .map(|(i, _)| i)
            .collect();

        if !transparent.is_empty() {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("OIT Accumulation Pass"),
                color_attachments: &[
                    Some(wgpu::RenderPassColorAttachment {
                        view: oit.accum_view(),
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    }),
                    Some(wgpu::RenderPassColorAttachment {
                        view: oit.reveal_view(),
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                            store: wgpu::StoreOp::Store,
                        },
                    }),
                ],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_bind_group(0, &scene_bind_group, &[]);
            pass.set_pipeline(&self.oit_pipeline);
            for index in transparent {
                issue_draw(&mut pass, &draws[index], &mesh_bind_groups[index], &mut stats);
            }
        }

        oit.record_composite(device, encoder, targets.color);

        stats
    }
}

fn issue_draw(
    pass: &mut wgpu::RenderPass<'_>,
    draw: &ResolvedDraw<'_>,
    bind_group: &wgpu::BindGroup,
    stats: &mut (u32, u32),
) {
    pass.set_bind_group(1, bind_group, &[]);
    pass.set_vertex_buffer(0, draw.buffers.vertex.slice(..));
    pass.set_index_buffer(draw.buffers.index.slice(..), wgpu::IndexFormat::Uint32);
    pass.draw_indexed(0..draw.index_count, 0, 0..draw.instance_count);
    stats.0 += 1;
    stats.1 += draw.instance_count;
}

//! Hierarchical depth pyramid.
//!
//! Occluder-flagged meshes render depth-only into the pyramid's base
//! target; a chain of compute reductions then halves it down to 1x1. Each
//! texel stores the farthest depth of its footprint, so a bounding volume
//! whose nearest depth lies in front of the stored value is never culled;
//! occlusion errs toward drawing.

use crate::instances::{MeshBuffers, Vertex};
use crate::math::Matrix4;
use std::sync::Arc;

/// One occluder mesh's contribution to the depth pre-pass.
pub struct OccluderDraw<'a> {
    /// The mesh's vertex and index buffers.
    pub buffers: MeshBuffers<'a>,
    /// Compacted instance buffer from the occluder cull pass.
    pub compacted: Arc<wgpu::Buffer>,
    /// Indices per instance.
    pub index_count: u32,
    /// Resolved survivor count.
    pub instance_count: u32,
}

/// The Hi-Z pyramid and the passes that fill it.
pub struct HzbPyramid {
    depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    pyramid: wgpu::Texture,
    pyramid_view: wgpu::TextureView,
    size: u32,
    mip_count: u32,

    depth_pipeline: wgpu::RenderPipeline,
    depth_bind_group_layout: wgpu::BindGroupLayout,
    depth_uniform: wgpu::Buffer,

    copy_pipeline: wgpu::ComputePipeline,
    copy_bind_group: wgpu::BindGroup,
    reduce_pipeline: wgpu::ComputePipeline,
    reduce_bind_groups: Vec<wgpu::BindGroup>,
}

impl HzbPyramid {
    /// Create the pyramid at the configured base resolution (rounded up to
    /// a power of two, at least 64).
    pub fn new(device: &wgpu::Device, resolution: u32) -> Self {
        let size = resolution.next_power_of_two().max(64);
        let mip_count = size.ilog2() + 1;

        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Occluder Depth Texture"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let pyramid = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Hi-Z Pyramid Texture"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let mip_views: Vec<wgpu::TextureView> = (0..mip_count)
            .map(|mip| {
                pyramid.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Hi-Z Mip View"),
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let pyramid_view = pyramid.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Hi-Z Full View"),
            base_mip_level: 0,
            mip_level_count: Some(mip_count),
            ..Default::default()
        });

        // Depth-only pipeline for the occluder pre-pass.
        let depth_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Occluder Depth Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/depth_only.wgsl").into()),
        });

        let depth_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Occluder Depth Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let depth_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Occluder Depth Pipeline Layout"),
            bind_group_layouts: &[&depth_bind_group_layout],
            push_constant_ranges: &[],
        });

        let depth_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Occluder Depth Pipeline"),
            layout: Some(&depth_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &depth_shader,
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
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: None,
            multiview: None,
            cache: None,
        });

        let depth_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Occluder Depth Uniform Buffer"),
            size: std::mem::size_of::<[[f32; 4]; 4]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Pyramid build pipelines.
        let copy_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Hi-Z Copy Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/hzb_copy.wgsl").into()),
        });
        let reduce_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Hi-Z Reduce Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/hzb_reduce.wgsl").into()),
        });

        let copy_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Hi-Z Copy Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: wgpu::TextureFormat::R32Float,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    },
                ],
            });

        let reduce_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Hi-Z Reduce Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: wgpu::TextureFormat::R32Float,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    },
                ],
            });

        let copy_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Hi-Z Copy Pipeline Layout"),
            bind_group_layouts: &[&copy_bind_group_layout],
            push_constant_ranges: &[],
        });
        let copy_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Hi-Z Copy Pipeline"),
            layout: Some(&copy_pipeline_layout),
            module: &copy_shader,
            entry_point: Some("copy_depth"),
            compilation_options: Default::default(),
            cache: None,
        });

        let reduce_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Hi-Z Reduce Pipeline Layout"),
            bind_group_layouts: &[&reduce_bind_group_layout],
            push_constant_ranges: &[],
        });
        let reduce_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Hi-Z Reduce Pipeline"),
            layout: Some(&reduce_pipeline_layout),
            module: &reduce_shader,
            entry_point: Some("reduce"),
            compilation_options: Default::default(),
            cache: None,
        });

        let copy_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Hi-Z Copy Bind Group"),
            layout: &copy_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&depth_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&mip_views[0]),
                },
            ],
        });

        let reduce_bind_groups = (1..mip_count as usize)
            .map(|mip| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Hi-Z Reduce Bind Group"),
                    layout: &reduce_bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&mip_views[mip - 1]),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&mip_views[mip]),
                        },
                    ],
                })
            })
            .collect();

        Self {
            depth_texture,
            depth_view,
            pyramid,
            pyramid_view,
            size,
            mip_count,
            depth_pipeline,
            depth_bind_group_layout,
            depth_uniform,
            copy_pipeline,
            copy_bind_group,
            reduce_pipeline,
            reduce_bind_groups,
        }
    }

    /// Base resolution of the pyramid.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of mip levels.
    #[inline]
    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    /// View over the whole mip chain, for the occlusion test.
    #[inline]
    pub fn pyramid_view(&self) -> &wgpu::TextureView {
        &self.pyramid_view
    }

    /// The pyramid texture.
    #[inline]
    pub fn pyramid_texture(&self) -> &wgpu::Texture {
        &self.pyramid
    }

    /// The occluder depth target.
    #[inline]
    pub fn depth_texture(&self) -> &wgpu::Texture {
        &self.depth_texture
    }

    /// View of the occluder depth target.
    #[inline]
    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    /// Record the occluder depth pre-pass.
    pub fn record_depth_pass(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        view_proj: &Matrix4,
        draws: &[OccluderDraw<'_>],
    ) {
        queue.write_buffer(
            &self.depth_uniform,
            0,
            bytemuck::bytes_of(&view_proj.to_cols_array_2d()),
        );

        let bind_groups: Vec<wgpu::BindGroup> = draws
            .iter()
            .map(|draw| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Occluder Depth Bind Group"),
                    layout: &self.depth_bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: self.depth_uniform.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: draw.compacted.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Occluder Depth Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.depth_pipeline);
        for (draw, bind_group) in draws.iter().zip(bind_groups.iter()) {
            if draw.instance_count == 0 {
                continue;
            }
            pass.set_bind_group(0, bind_group, &[]);
            pass.set_vertex_buffer(0, draw.buffers.vertex.slice(..));
            pass.set_index_buffer(draw.buffers.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.index_count, 0, 0..draw.instance_count);
        }
    }

    /// Record the pyramid build: copy depth into mip 0, then reduce each
    /// level into the next at half resolution.
    pub fn record_build(&self, encoder: &mut wgpu::CommandEncoder) {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Hi-Z Copy Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.copy_pipeline);
            pass.set_bind_group(0, &self.copy_bind_group, &[]);
            pass.dispatch_workgroups(self.size.div_ceil(8), self.size.div_ceil(8), 1);
        }

        for (mip, bind_group) in self.reduce_bind_groups.iter().enumerate() {
            let dst_size = (self.size >> (mip + 1)).max(1);
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Hi-Z Reduce Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.reduce_pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(dst_size.div_ceil(8), dst_size.div_ceil(8), 1);
        }
    }
}

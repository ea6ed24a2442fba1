//! # Instance Module
//!
//! The per-mesh instance slot allocator. Each mesh that can appear in the
//! scene owns a growable table of instance transforms with a GPU mirror
//! buffer the culling stage streams through. Slots are stable integers:
//! attaching a renderable claims the lowest free slot, detaching releases
//! it for reuse.

mod allocator;
mod table;

pub use allocator::{InstanceAllocator, MeshEntry};
pub use table::InstanceTable;

use crate::core::Id;
use crate::math::{Matrix4, Sphere};
use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// Errors reported by the instance allocator.
///
/// These indicate bookkeeping bugs in the caller, not recoverable
/// conditions; the renderer logs them and continues the frame.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InstanceError {
    /// No instance table exists for the given mesh.
    #[error("mesh {0} has no instance table")]
    UnknownMesh(Id),

    /// The slot is out of range, already free, or attached by a different owner.
    #[error("slot {slot} of mesh {mesh} is not held by entity {owner}")]
    SlotNotOwned {
        /// The mesh whose table was addressed.
        mesh: Id,
        /// The entity claimed as owner.
        owner: Id,
        /// The slot index in question.
        slot: u32,
    },
}

/// An opaque handle to an instance slot, returned by attach and consumed by
/// detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceSlot {
    index: u32,
}

impl InstanceSlot {
    /// The slot's index within its mesh's table.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn new(index: u32) -> Self {
        Self { index }
    }
}

/// One instance record as the GPU sees it (80 bytes).
///
/// The object-to-world matrix is stored transposed (rows), matching the
/// row-vector convention of the shading code. Liveness is an explicit flag
/// so a freed slot can never be mistaken for a renderable one regardless of
/// what transform bits remain in the buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    /// Rows of the object-to-world matrix.
    pub transform: [[f32; 4]; 4],
    /// Low bits of the owning entity's id.
    pub owner: u32,
    /// 1 while the slot is attached, 0 once released.
    pub live: u32,
    /// Padding to a 16-byte boundary.
    pub _pad: [u32; 2],
}

impl Default for InstanceData {
    fn default() -> Self {
        Self {
            transform: Matrix4::IDENTITY.to_cols_array_2d(),
            owner: 0,
            live: 0,
            _pad: [0; 2],
        }
    }
}

impl InstanceData {
    /// Build a live record from an owner and a world transform.
    pub fn new(owner: Id, world: &Matrix4) -> Self {
        Self {
            transform: world.transposed().to_cols_array_2d(),
            owner: owner.value() as u32,
            live: 1,
            _pad: [0; 2],
        }
    }
}

/// What the resource layer tells the core about a mesh.
#[derive(Debug, Clone)]
pub struct MeshSource {
    /// Number of indices per draw.
    pub index_count: u32,
    /// Number of vertices in the mesh.
    pub vertex_count: u32,
    /// Primitive topology.
    pub topology: wgpu::PrimitiveTopology,
    /// Object-space bounding sphere.
    pub bounds: Sphere,
    /// Whether the mesh contributes to the occluder depth pre-pass.
    pub occluder: bool,
}

/// The resource layer's GPU buffers for a mesh.
#[derive(Clone, Copy)]
pub struct MeshBuffers<'a> {
    /// Vertex buffer holding [`Vertex`] records.
    pub vertex: &'a wgpu::Buffer,
    /// 32-bit index buffer.
    pub index: &'a wgpu::Buffer,
}

/// Vertex layout the depth and forward passes expect (24 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
        wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
            shader_location: 1,
            format: wgpu::VertexFormat::Float32x3,
        },
    ];

    /// Vertex buffer layout for pipeline creation.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

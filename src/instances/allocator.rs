//! Per-mesh table management and GPU mirror write-through.

use super::{InstanceData, InstanceError, InstanceSlot, InstanceTable, MeshSource};
use crate::core::Id;
use crate::math::Matrix4;
use std::collections::HashMap;

/// An instance table paired with the mesh description and mirror buffer the
/// GPU stages consume.
pub struct MeshEntry {
    /// The mesh description from the resource layer.
    pub source: MeshSource,
    /// CPU-side slot bookkeeping.
    pub table: InstanceTable,
    buffer: wgpu::Buffer,
}

impl MeshEntry {
    /// The GPU mirror of the instance table.
    #[inline]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

fn create_mirror(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Instance Table Buffer"),
        size: capacity as u64 * std::mem::size_of::<InstanceData>() as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn write_slot(queue: &wgpu::Queue, buffer: &wgpu::Buffer, slot: u32, record: &InstanceData) {
    let offset = slot as u64 * std::mem::size_of::<InstanceData>() as u64;
    queue.write_buffer(buffer, offset, bytemuck::bytes_of(record));
}

/// Owns one instance table per mesh and keeps each table's GPU mirror
/// element-for-element consistent with it.
///
/// All mutation goes through `&mut self`, so table growth can never race an
/// attach or detach on the same mesh.
pub struct InstanceAllocator {
    entries: HashMap<Id, MeshEntry>,
    initial_capacity: u32,
}

impl InstanceAllocator {
    /// Create an allocator whose tables start at the given capacity.
    pub fn new(initial_capacity: u32) -> Self {
        Self {
            entries: HashMap::new(),
            initial_capacity: initial_capacity.max(1),
        }
    }

    /// Attach a renderable occurrence of a mesh, claiming a slot.
    ///
    /// The first attach for a mesh creates its table and mirror from
    /// `source`. A full table doubles, re-uploads, and leaves the old
    /// mirror for the culling stage to drop when it next rebinds.
    pub fn attach(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        mesh: Id,
        source: &MeshSource,
        owner: Id,
        world: &Matrix4,
    ) -> InstanceSlot {
        let initial_capacity = self.initial_capacity;
        let entry = self.entries.entry(mesh).or_insert_with(|| {
            log::debug!("creating instance table for mesh {mesh} ({initial_capacity} slots)");
            MeshEntry {
                source: source.clone(),
                table: InstanceTable::new(mesh, initial_capacity),
                buffer: create_mirror(device, initial_capacity),
            }
        });

        let (slot, grown) = entry.table.attach(owner, world);
        if grown {
            log::debug!(
                "instance table for mesh {mesh} grew to {} slots",
                entry.table.capacity()
            );
            entry.buffer = create_mirror(device, entry.table.capacity());
            queue.write_buffer(&entry.buffer, 0, bytemuck::cast_slice(entry.table.records()));
        } else {
            write_slot(queue, &entry.buffer, slot.index(), entry.table.record(slot.index()));
        }
        slot
    }

    /// Release a slot. The mirror record is marked dead in place.
    pub fn detach(
        &mut self,
        queue: &wgpu::Queue,
        mesh: Id,
        owner: Id,
        slot: InstanceSlot,
    ) -> Result<(), InstanceError> {
        let entry = self
            .entries
            .get_mut(&mesh)
            .ok_or(InstanceError::UnknownMesh(mesh))?;
        entry.table.detach(owner, slot)?;
        write_slot(queue, &entry.buffer, slot.index(), entry.table.record(slot.index()));
        Ok(())
    }

    /// Move a live instance, writing the new transform through to the mirror.
    pub fn write_transform(
        &mut self,
        queue: &wgpu::Queue,
        mesh: Id,
        owner: Id,
        slot: InstanceSlot,
        world: &Matrix4,
    ) -> Result<(), InstanceError> {
        let entry = self
            .entries
            .get_mut(&mesh)
            .ok_or(InstanceError::UnknownMesh(mesh))?;
        entry.table.write_transform(owner, slot, world)?;
        write_slot(queue, &entry.buffer, slot.index(), entry.table.record(slot.index()));
        Ok(())
    }

    /// Tear down a mesh's table when the resource is unloaded.
    pub fn remove_mesh(&mut self, mesh: Id) -> Result<(), InstanceError> {
        match self.entries.remove(&mesh) {
            Some(entry) => {
                if entry.table.live_count() > 0 {
                    log::warn!(
                        "mesh {mesh} unloaded with {} instances still attached",
                        entry.table.live_count()
                    );
                }
                Ok(())
            }
            None => Err(InstanceError::UnknownMesh(mesh)),
        }
    }

    /// Look up a mesh's entry.
    #[inline]
    pub fn entry(&self, mesh: Id) -> Option<&MeshEntry> {
        self.entries.get(&mesh)
    }

    /// Iterate all meshes with instance tables.
    pub fn iter(&self) -> impl Iterator<Item = (Id, &MeshEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    /// Number of meshes with live tables.
    #[inline]
    pub fn mesh_count(&self) -> usize {
        self.entries.len()
    }
}

//! Asynchronous survivor-count readback.

use std::sync::Arc;

/// A pending GPU result: the number of instances that survived a culling
/// pass.
///
/// The value only exists on the GPU until the commands that produced it
/// drain. `resolve` blocks until then, so callers schedule all culling
/// passes first and resolve counts afterwards, letting submission overlap
/// GPU latency.
pub struct SurvivorCount {
    staging: Arc<wgpu::Buffer>,
    resolved: Option<u32>,
}

impl SurvivorCount {
    pub(crate) fn new(staging: Arc<wgpu::Buffer>) -> Self {
        Self {
            staging,
            resolved: None,
        }
    }

    /// Read the count, blocking until the GPU has produced it.
    pub fn resolve(&mut self, device: &wgpu::Device) -> u32 {
        if let Some(count) = self.resolved {
            return count;
        }

        let slice = self.staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        let _ = device.poll(wgpu::Maintain::Wait);

        let count = {
            let data = slice.get_mapped_range();
            u32::from_le_bytes([data[0], data[1], data[2], data[3]])
        };
        self.staging.unmap();

        self.resolved = Some(count);
        count
    }
}

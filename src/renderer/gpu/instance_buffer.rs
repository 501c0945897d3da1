// renderer/gpu/instance_buffer.rs
use std::mem;
use std::ops::Range;

use crate::renderer::job::InstanceData;

/// Per-instance vertex stream shared by every draw of a group.
///
/// Instances are staged on the CPU while the pass records and written in one
/// `write_buffer` before submission, so the buffer can only grow between
/// groups (`reserve`), never while a pass references it.
pub struct InstanceBuffer {
    buffer: wgpu::Buffer,
    capacity: u32,
    scratch: Vec<InstanceData>,
}

impl InstanceBuffer {
    pub fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: create_buffer(device, capacity),
            capacity,
            scratch: Vec::with_capacity(capacity as usize),
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Clears staged instances and makes room for `required` of them.
    pub fn begin(&mut self, device: &wgpu::Device, required: u32) {
        self.scratch.clear();
        if required > self.capacity {
            self.grow(device, required);
        }
    }

    /// Returns the instance range the staged data will occupy, or `None`
    /// once the reserved capacity is exhausted.
    pub fn stage(&mut self, instances: &[InstanceData]) -> Option<Range<u32>> {
        let start = self.scratch.len() as u32;
        let end = start + instances.len() as u32;
        if end > self.capacity {
            return None;
        }
        self.scratch.extend_from_slice(instances);
        Some(start..end)
    }

    pub fn staged(&self) -> usize {
        self.scratch.len()
    }

    pub fn flush(&mut self, queue: &wgpu::Queue) {
        if !self.scratch.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&self.scratch));
        }
    }

    fn grow(&mut self, device: &wgpu::Device, required: u32) {
        let new_capacity = required.max(self.capacity * 2).max(1);
        log::info!(
            "Growing instance buffer: {} -> {}",
            self.capacity,
            new_capacity
        );
        self.buffer = create_buffer(device, new_capacity);
        self.capacity = new_capacity;
    }
}

fn create_buffer(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("InstanceBuffer"),
        size: (capacity as usize * mem::size_of::<InstanceData>()) as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

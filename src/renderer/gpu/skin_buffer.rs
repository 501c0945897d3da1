// renderer/gpu/skin_buffer.rs
use std::mem;

use glam::Mat4;

use crate::renderer::skin::SkinMatrixTable;

/// Storage buffer holding the frame's baked joint matrices, indexed by
/// `SkinTableId` plus joint index in the skinned vertex entry point.
pub struct SkinMatrixBuffer {
    buffer: wgpu::Buffer,
    capacity: u32,
    bind_group: wgpu::BindGroup,
    bind_layout: wgpu::BindGroupLayout,
}

impl SkinMatrixBuffer {
    pub fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SkinMatricesBindLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let capacity = capacity.max(1);
        let buffer = create_buffer(device, capacity);
        let bind_group = create_bind_group(device, &bind_layout, &buffer);

        Self {
            buffer,
            capacity,
            bind_group,
            bind_layout,
        }
    }

    pub fn bind_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Uploads the table's matrices. Call before the group that draws the
    /// skinned jobs referencing them.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, table: &SkinMatrixTable) {
        table.bake(|matrices| {
            let required = matrices.len() as u32;
            if required > self.capacity {
                self.grow(device, required);
            }
            let columns: Vec<[[f32; 4]; 4]> = matrices.iter().map(Mat4::to_cols_array_2d).collect();
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&columns));
        });
    }

    fn grow(&mut self, device: &wgpu::Device, required: u32) {
        let new_capacity = required.max(self.capacity * 2).max(1);
        log::info!(
            "Growing skin matrix buffer: {} -> {}",
            self.capacity,
            new_capacity
        );
        self.buffer = create_buffer(device, new_capacity);
        self.bind_group = create_bind_group(device, &self.bind_layout, &self.buffer);
        self.capacity = new_capacity;
    }
}

fn create_buffer(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("SkinMatricesBuffer"),
        size: (capacity as usize * mem::size_of::<[[f32; 4]; 4]>()) as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("SkinMatricesBindGroup"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    })
}

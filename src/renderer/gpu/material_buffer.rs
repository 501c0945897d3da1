// renderer/gpu/material_buffer.rs
use std::collections::HashMap;
use std::mem;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};

use crate::renderer::material::{Material, MaterialKey, ShadingParams};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    pub specular_power: f32,
    pub emissive_strength: f32,
    pub alpha_cutoff: f32,
    pub _padding: f32,
}

impl MaterialUniform {
    pub fn from_params(params: &ShadingParams) -> Self {
        Self {
            base_color: params.base_color.to_array(),
            specular_power: params.specular_power,
            emissive_strength: params.emissive_strength,
            alpha_cutoff: params.alpha_cutoff,
            _padding: 0.0,
        }
    }
}

/// Shading parameters of every material bound during one group, addressed
/// with a dynamic offset. Each material is staged once per group.
pub(crate) struct MaterialParamsBuffer {
    buffer: wgpu::Buffer,
    capacity: u32,
    stride: u32,
    bind_group: wgpu::BindGroup,
    bind_layout: wgpu::BindGroupLayout,
    scratch: Vec<u8>,
    lookup: HashMap<MaterialKey, u32>,
}

impl MaterialParamsBuffer {
    pub(crate) fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("MaterialParamsBindLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(mem::size_of::<MaterialUniform>() as u64),
                },
                count: None,
            }],
        });

        let alignment = device.limits().min_uniform_buffer_offset_alignment;
        let size = mem::size_of::<MaterialUniform>() as u32;
        let stride = size.div_ceil(alignment) * alignment;

        let capacity = capacity.max(1);
        let buffer = create_buffer(device, capacity, stride);
        let bind_group = create_bind_group(device, &bind_layout, &buffer);

        Self {
            buffer,
            capacity,
            stride,
            bind_group,
            bind_layout,
            scratch: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    pub(crate) fn bind_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_layout
    }

    pub(crate) fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub(crate) fn begin(&mut self, device: &wgpu::Device, required: u32) {
        self.scratch.clear();
        self.lookup.clear();
        if required > self.capacity {
            self.grow(device, required);
        }
    }

    /// Dynamic offset of the material's parameters, or `None` when the
    /// group reserved too few slots.
    pub(crate) fn offset_for(&mut self, material: Option<&Material>) -> Option<u32> {
        let key = MaterialKey::of_ref(material);
        if let Some(&offset) = self.lookup.get(&key) {
            return Some(offset);
        }

        let slot = self.lookup.len() as u32;
        if slot >= self.capacity {
            return None;
        }
        let offset = slot * self.stride;
        let params = material.map(|m| m.params).unwrap_or_default();
        self.scratch.resize((offset + self.stride) as usize, 0);
        let size = mem::size_of::<MaterialUniform>();
        self.scratch[offset as usize..offset as usize + size]
            .copy_from_slice(bytemuck::bytes_of(&MaterialUniform::from_params(&params)));
        self.lookup.insert(key, offset);
        Some(offset)
    }

    pub(crate) fn flush(&self, queue: &wgpu::Queue) {
        if !self.scratch.is_empty() {
            queue.write_buffer(&self.buffer, 0, &self.scratch);
        }
    }

    fn grow(&mut self, device: &wgpu::Device, required: u32) {
        let new_capacity = required.max(self.capacity * 2).max(1);
        log::info!(
            "Growing material params buffer: {} -> {}",
            self.capacity,
            new_capacity
        );
        self.buffer = create_buffer(device, new_capacity, self.stride);
        self.bind_group = create_bind_group(device, &self.bind_layout, &self.buffer);
        self.capacity = new_capacity;
    }
}

fn create_buffer(device: &wgpu::Device, capacity: u32, stride: u32) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("MaterialParamsBuffer"),
        size: capacity as u64 * stride as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("MaterialParamsBindGroup"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: NonZeroU64::new(mem::size_of::<MaterialUniform>() as u64),
            }),
        }],
    })
}

// renderer/gpu/mesh.rs
use std::collections::HashMap;
use std::mem;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::renderer::job::{InstanceData, MeshKey};
use crate::renderer::variant::{InputLayout, StepMode, VertexAttribute, VertexStream};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct ModelVertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    /// xyz tangent, w handedness.
    pub tangent: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct SkinVertex {
    pub joints: [u32; 4],
    pub weights: [f32; 4],
}

/// Shader location, format and byte offset of every mesh attribute. Variants
/// that skip an attribute keep the same stride.
pub(crate) fn attribute_format(attribute: VertexAttribute) -> (u32, wgpu::VertexFormat, u64) {
    match attribute {
        VertexAttribute::Position => (0, wgpu::VertexFormat::Float32x3, 0),
        VertexAttribute::Normal => (1, wgpu::VertexFormat::Float32x3, 12),
        VertexAttribute::Uv => (2, wgpu::VertexFormat::Float32x2, 24),
        VertexAttribute::Tangent => (3, wgpu::VertexFormat::Float32x4, 32),
        VertexAttribute::JointIndices => (4, wgpu::VertexFormat::Uint32x4, 0),
        VertexAttribute::JointWeights => (5, wgpu::VertexFormat::Float32x4, 16),
    }
}

pub(crate) const INSTANCE_ATTRS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    6 => Float32x4,
    7 => Float32x4,
    8 => Float32x4,
    9 => Float32x4,
    10 => Uint32
];

/// Owned form of a variant's vertex buffer layouts; borrow with `layouts()`.
pub(crate) struct VertexStreams {
    streams: Vec<(u64, wgpu::VertexStepMode, Vec<wgpu::VertexAttribute>)>,
}

impl VertexStreams {
    pub(crate) fn for_layout(layout: &InputLayout) -> Self {
        let streams = layout.streams.iter().map(stream_layout).collect();
        Self { streams }
    }

    pub(crate) fn layouts(&self) -> Vec<wgpu::VertexBufferLayout<'_>> {
        self.streams
            .iter()
            .map(|(stride, step_mode, attributes)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: *step_mode,
                attributes,
            })
            .collect()
    }
}

fn stream_layout(stream: &VertexStream) -> (u64, wgpu::VertexStepMode, Vec<wgpu::VertexAttribute>) {
    if stream.step == StepMode::Instance {
        return (
            mem::size_of::<InstanceData>() as u64,
            wgpu::VertexStepMode::Instance,
            INSTANCE_ATTRS.to_vec(),
        );
    }

    let is_joint_stream = stream.attributes.iter().any(|attribute| {
        matches!(
            attribute,
            VertexAttribute::JointIndices | VertexAttribute::JointWeights
        )
    });
    let stride = if is_joint_stream {
        mem::size_of::<SkinVertex>()
    } else {
        mem::size_of::<ModelVertex>()
    };
    let attributes = stream
        .attributes
        .iter()
        .map(|&attribute| {
            let (shader_location, format, offset) = attribute_format(attribute);
            wgpu::VertexAttribute {
                format,
                offset,
                shader_location,
            }
        })
        .collect();
    (stride as u64, wgpu::VertexStepMode::Vertex, attributes)
}

pub struct GpuMesh {
    vertices: wgpu::Buffer,
    joints: Option<wgpu::Buffer>,
    indices: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    pub fn new(
        device: &wgpu::Device,
        vertices: &[ModelVertex],
        indices: &[u32],
        joints: Option<&[SkinVertex]>,
    ) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ModelMesh.VertexBuffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let joints = joints.map(|joints| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("ModelMesh.JointBuffer"),
                contents: bytemuck::cast_slice(joints),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ModelMesh.IndexBuffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertices: vertex_buffer,
            joints,
            indices: index_buffer,
            index_count: indices.len() as u32,
        }
    }

    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertices
    }

    pub fn joint_buffer(&self) -> Option<&wgpu::Buffer> {
        self.joints.as_ref()
    }

    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.indices
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// GPU meshes addressed by the `MeshKey` carried on jobs.
#[derive(Default)]
pub struct MeshRegistry {
    meshes: HashMap<MeshKey, GpuMesh>,
}

impl MeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: MeshKey, mesh: GpuMesh) -> Option<GpuMesh> {
        self.meshes.insert(key, mesh)
    }

    pub fn remove(&mut self, key: MeshKey) -> Option<GpuMesh> {
        self.meshes.remove(&key)
    }

    pub fn get(&self, key: MeshKey) -> Option<&GpuMesh> {
        self.meshes.get(&key)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

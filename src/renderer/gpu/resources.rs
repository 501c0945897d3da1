// renderer/gpu/resources.rs
use std::collections::HashMap;
use std::mem;

use crate::renderer::camera::{Camera, CameraUniform};
use crate::renderer::command::PassState;
use crate::renderer::job::MeshKey;
use crate::renderer::lights::{LightSet, LightsUniform};
use crate::renderer::mask::MaskKey;
use crate::renderer::material::{Material, TextureHandle, TextureSlot};
use crate::renderer::skin::SkinMatrixTable;
use crate::renderer::variant::Variant;

use super::compiler::WgpuProgram;
use super::instance_buffer::InstanceBuffer;
use super::material_buffer::MaterialParamsBuffer;
use super::mesh::{GpuMesh, MeshRegistry, ModelVertex, SkinVertex, VertexStreams};
use super::pipeline_builder::{blend_state, color_writes, PipelineBuilder};
use super::skin_buffer::SkinMatrixBuffer;
use super::targets::{DEPTH_FORMAT, GBUFFER_ALBEDO_FORMAT, GBUFFER_NORMAL_FORMAT};

const NO_TEXTURE: u32 = u32::MAX;

/// Attachments a pipeline renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TargetFormats {
    GBuffer,
    Color {
        format: wgpu::TextureFormat,
        sample_count: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    mask: MaskKey,
    state: PassState,
    targets: TargetFormats,
}

/// Device-side state shared by every group and frame: bind group layouts,
/// per-frame uniforms, registered meshes and textures, and the pipeline
/// cache keyed by (mask, pass state, targets).
pub struct ModelGpu {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pipeline_layout: wgpu::PipelineLayout,
    camera_buffer: wgpu::Buffer,
    lights_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    fallback: wgpu::TextureView,
    textures: Vec<Option<wgpu::TextureView>>,
    texture_groups: HashMap<[u32; TextureSlot::COUNT], wgpu::BindGroup>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    pub(crate) params: MaterialParamsBuffer,
    pub(crate) instances: InstanceBuffer,
    pub(crate) skin: SkinMatrixBuffer,
    pub(crate) meshes: MeshRegistry,
}

impl ModelGpu {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, instance_capacity: u32) -> Self {
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ModelFrameBindLayout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
            ],
        });

        let slot_count = TextureSlot::COUNT as u32;
        let mut texture_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..slot_count)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        texture_entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot_count,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ModelTexturesBindLayout"),
            entries: &texture_entries,
        });

        let params = MaterialParamsBuffer::new(device, 64);
        let skin = SkinMatrixBuffer::new(device, 64);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ModelPipelineLayout"),
            bind_group_layouts: &[
                &frame_layout,
                params.bind_layout(),
                &texture_layout,
                skin.bind_layout(),
            ],
            push_constant_ranges: &[],
        });

        let camera_buffer =
            create_uniform(device, "ModelCameraBuffer", mem::size_of::<CameraUniform>());
        let lights_buffer =
            create_uniform(device, "ModelLightsBuffer", mem::size_of::<LightsUniform>());
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ModelFrameBindGroup"),
            layout: &frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights_buffer.as_entire_binding(),
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ModelMaterialSampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            device: device.clone(),
            queue: queue.clone(),
            pipeline_layout,
            camera_buffer,
            lights_buffer,
            frame_bind_group,
            texture_layout,
            sampler,
            fallback: white_texture(device, queue),
            textures: Vec::new(),
            texture_groups: HashMap::new(),
            pipelines: HashMap::new(),
            params,
            instances: InstanceBuffer::new(device, instance_capacity),
            skin,
            meshes: MeshRegistry::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn upload_mesh(
        &mut self,
        key: MeshKey,
        vertices: &[ModelVertex],
        indices: &[u32],
        joints: Option<&[SkinVertex]>,
    ) {
        let mesh = GpuMesh::new(&self.device, vertices, indices, joints);
        if self.meshes.insert(key, mesh).is_some() {
            log::debug!("Replaced GPU mesh {:?}", key);
        }
    }

    pub fn remove_mesh(&mut self, key: MeshKey) -> bool {
        self.meshes.remove(key).is_some()
    }

    pub fn meshes(&self) -> &MeshRegistry {
        &self.meshes
    }

    /// Allocates a texture slot that materials can reference before the
    /// image has finished loading.
    pub fn reserve_texture(&mut self) -> TextureHandle {
        let index = self.textures.len() as u32;
        self.textures.push(None);
        TextureHandle::pending(index)
    }

    /// Publishes the view and flips the handle to ready.
    pub fn upload_texture(&mut self, handle: &TextureHandle, view: wgpu::TextureView) {
        let index = handle.index() as usize;
        if index >= self.textures.len() {
            self.textures.resize(index + 1, None);
        }
        if self.textures[index].replace(view).is_some() {
            self.texture_groups
                .retain(|indices, _| !indices.contains(&handle.index()));
        }
        handle.mark_ready();
    }

    pub fn register_texture(&mut self, view: wgpu::TextureView) -> TextureHandle {
        let handle = self.reserve_texture();
        self.upload_texture(&handle, view);
        handle
    }

    pub fn upload_skin_matrices(&mut self, table: &SkinMatrixTable) {
        self.skin.upload(&self.device, &self.queue, table);
    }

    pub(crate) fn write_frame_uniforms(&self, camera: &Camera, lights: Option<&LightSet>) {
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&camera.uniform()));
        if let Some(lights) = lights {
            self.queue
                .write_buffer(&self.lights_buffer, 0, bytemuck::bytes_of(&lights.uniform()));
        }
    }

    pub(crate) fn frame_bind_group(&self) -> &wgpu::BindGroup {
        &self.frame_bind_group
    }

    /// Texture bind group for a material; absent or still-loading slots
    /// sample a 1x1 white texture.
    pub(crate) fn texture_bind_group(&mut self, material: Option<&Material>) -> wgpu::BindGroup {
        let mut indices = [NO_TEXTURE; TextureSlot::COUNT];
        if let Some(material) = material {
            for slot in TextureSlot::ALL {
                if let Some(texture) = material.texture(slot) {
                    let uploaded = self
                        .textures
                        .get(texture.index() as usize)
                        .is_some_and(Option::is_some);
                    if texture.is_ready() && uploaded {
                        indices[slot.index()] = texture.index();
                    }
                }
            }
        }

        if let Some(group) = self.texture_groups.get(&indices) {
            return group.clone();
        }

        let group = {
            let views: Vec<&wgpu::TextureView> = indices
                .iter()
                .map(|&index| {
                    self.textures
                        .get(index as usize)
                        .and_then(Option::as_ref)
                        .unwrap_or(&self.fallback)
                })
                .collect();
            let mut entries: Vec<wgpu::BindGroupEntry> = views
                .iter()
                .enumerate()
                .map(|(binding, view)| wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: wgpu::BindingResource::TextureView(view),
                })
                .collect();
            entries.push(wgpu::BindGroupEntry {
                binding: TextureSlot::COUNT as u32,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });

            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("ModelTexturesBindGroup"),
                layout: &self.texture_layout,
                entries: &entries,
            })
        };
        self.texture_groups.insert(indices, group.clone());
        group
    }

    pub(crate) fn pipeline(
        &mut self,
        mask: MaskKey,
        variant: &Variant<WgpuProgram>,
        state: &PassState,
        targets: TargetFormats,
    ) -> wgpu::RenderPipeline {
        let key = PipelineKey {
            mask,
            state: *state,
            targets,
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return pipeline.clone();
        }

        log::debug!("Building pipeline for {:?} {:?} {:?}", mask, state.pass, targets);
        let streams = variant
            .layout
            .as_ref()
            .map(VertexStreams::for_layout);
        let mut builder = PipelineBuilder::new(
            &self.device,
            &self.pipeline_layout,
            &variant.vertex.module,
            variant.vertex.entry,
        )
        .with_label("ModelPipeline")
        .with_pass_state(DEPTH_FORMAT, state);
        if let Some(streams) = streams.as_ref() {
            builder = builder.with_vertex_buffers(streams.layouts());
        }
        if let Some(pixel) = variant.pixel.as_ref() {
            builder = builder.with_fragment(&pixel.module, pixel.entry);
        }

        let writes = color_writes(state);
        let builder = match targets {
            TargetFormats::GBuffer => builder
                .with_color_target(GBUFFER_ALBEDO_FORMAT, None, writes)
                .with_color_target(GBUFFER_NORMAL_FORMAT, None, writes),
            TargetFormats::Color {
                format,
                sample_count,
            } => builder
                .with_color_target(format, blend_state(state.blend), writes)
                .with_multisample(sample_count),
        };

        let pipeline = builder.build();
        self.pipelines.insert(key, pipeline.clone());
        pipeline
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_uniform(device: &wgpu::Device, label: &str, size: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn white_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width: 1,
        height: 1,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("ModelFallbackTexture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255, 255, 255, 255],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        size,
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

// renderer/gpu/sink.rs
use std::ops::Range;

use crate::renderer::command::{CommandSink, GroupSetup, GroupTarget, PassState};
use crate::renderer::job::{InstanceData, MeshKey};
use crate::renderer::mask::MaskKey;
use crate::renderer::material::Material;
use crate::renderer::variant::Variant;

use super::compiler::WgpuProgram;
use super::resources::{ModelGpu, TargetFormats};
use super::targets::{ColorTarget, GBuffer};

/// Records one group into its own render pass and submits it on
/// `end_group`. Instance and material data are staged while recording and
/// written right before submission.
pub struct WgpuCommandSink<'a> {
    gpu: &'a mut ModelGpu,
    gbuffer: &'a GBuffer,
    depth: &'a wgpu::TextureView,
    encoder: Option<wgpu::CommandEncoder>,
    pass: Option<wgpu::RenderPass<'static>>,
    targets: TargetFormats,
    variant: Option<(MaskKey, Variant<WgpuProgram>)>,
    uploaded: Option<Range<u32>>,
    draws: usize,
}

impl<'a> WgpuCommandSink<'a> {
    pub fn new(gpu: &'a mut ModelGpu, gbuffer: &'a GBuffer, depth: &'a wgpu::TextureView) -> Self {
        Self {
            gpu,
            gbuffer,
            depth,
            encoder: None,
            pass: None,
            targets: TargetFormats::GBuffer,
            variant: None,
            uploaded: None,
            draws: 0,
        }
    }

    /// Draw calls recorded since the sink was created.
    pub fn draw_count(&self) -> usize {
        self.draws
    }

    fn draw_mesh(&mut self, mesh: MeshKey, instances: Range<u32>) {
        let Some(pass) = self.pass.as_mut() else {
            return;
        };
        let Some((mask, _)) = self.variant.as_ref() else {
            log::warn!("Draw of {:?} without a bound variant", mesh);
            return;
        };
        let Some(gpu_mesh) = self.gpu.meshes.get(mesh) else {
            log::warn!("No GPU mesh registered for {:?}", mesh);
            return;
        };

        pass.set_vertex_buffer(0, gpu_mesh.vertex_buffer().slice(..));
        if mask.is_skinned() {
            let Some(joints) = gpu_mesh.joint_buffer() else {
                log::warn!("Skinned draw of {:?} but the mesh has no joint stream", mesh);
                return;
            };
            pass.set_vertex_buffer(1, joints.slice(..));
        }
        pass.set_index_buffer(gpu_mesh.index_buffer().slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..gpu_mesh.index_count(), 0, instances);
        self.draws += 1;
    }
}

impl CommandSink for WgpuCommandSink<'_> {
    type Program = WgpuProgram;
    type Target = ColorTarget;

    fn begin_group(&mut self, setup: GroupSetup<'_, ColorTarget>) {
        let capacity = setup.instance_capacity as u32;
        self.gpu.write_frame_uniforms(setup.camera, setup.lights);
        self.gpu.instances.begin(&self.gpu.device, capacity);
        self.gpu.params.begin(&self.gpu.device, capacity);
        self.variant = None;
        self.uploaded = None;

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ModelGroupEncoder"),
            });

        let pass = match setup.target {
            GroupTarget::GBuffer => {
                self.targets = TargetFormats::GBuffer;
                let clear = wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                };
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("ModelDeferredPass"),
                    color_attachments: &[
                        Some(wgpu::RenderPassColorAttachment {
                            view: &self.gbuffer.albedo,
                            resolve_target: None,
                            depth_slice: None,
                            ops: clear,
                        }),
                        Some(wgpu::RenderPassColorAttachment {
                            view: &self.gbuffer.normal,
                            resolve_target: None,
                            depth_slice: None,
                            ops: clear,
                        }),
                    ],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: self.depth,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
            }
            GroupTarget::Color(target) => {
                self.targets = TargetFormats::Color {
                    format: target.desc.format,
                    sample_count: target.desc.sample_count,
                };
                // Depth is loaded so blended surfaces are hidden behind opaque ones.
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("ModelBlendedPass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &target.view,
                        resolve_target: None,
                        depth_slice: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: self.depth,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
            }
        };

        let mut pass = pass.forget_lifetime();
        pass.set_bind_group(0, self.gpu.frame_bind_group(), &[]);
        pass.set_bind_group(3, self.gpu.skin.bind_group(), &[]);
        self.pass = Some(pass);
        self.encoder = Some(encoder);
    }

    fn bind_variant(&mut self, mask: MaskKey, variant: &Variant<WgpuProgram>) {
        if let (Some(pass), Some(layout)) = (self.pass.as_mut(), variant.layout.as_ref()) {
            pass.set_vertex_buffer(layout.instance_slot(), self.gpu.instances.buffer().slice(..));
        }
        self.variant = Some((mask, variant.clone()));
    }

    fn bind_material(&mut self, material: Option<&Material>, state: &PassState) {
        let Some((mask, variant)) = self.variant.as_ref() else {
            log::warn!("Material bound before any variant");
            return;
        };
        let pipeline = self.gpu.pipeline(*mask, variant, state, self.targets);
        let Some(offset) = self.gpu.params.offset_for(material) else {
            log::error!("Material parameter slots exhausted for this group");
            return;
        };
        let textures = self.gpu.texture_bind_group(material);

        if let Some(pass) = self.pass.as_mut() {
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(1, self.gpu.params.bind_group(), &[offset]);
            pass.set_bind_group(2, &textures, &[]);
        }
    }

    fn upload_instances(&mut self, instances: &[InstanceData]) {
        self.uploaded = self.gpu.instances.stage(instances);
        if self.uploaded.is_none() {
            log::error!(
                "Instance buffer overflow: {} staged, {} more requested, capacity {}",
                self.gpu.instances.staged(),
                instances.len(),
                self.gpu.instances.capacity()
            );
        }
    }

    fn draw_instanced(&mut self, mesh: MeshKey, instance_count: u32) {
        let Some(range) = self.uploaded.take() else {
            return;
        };
        let end = range.start + instance_count.min(range.end - range.start);
        self.draw_mesh(mesh, range.start..end);
    }

    fn draw(&mut self, mesh: MeshKey, instance: &InstanceData) {
        match self.gpu.instances.stage(std::slice::from_ref(instance)) {
            Some(range) => self.draw_mesh(mesh, range),
            None => log::error!("Instance buffer overflow drawing {:?}", mesh),
        }
    }

    fn end_group(&mut self) {
        // The pass must end before the encoder can finish.
        self.pass = None;
        self.variant = None;
        let Some(encoder) = self.encoder.take() else {
            return;
        };
        self.gpu.instances.flush(&self.gpu.queue);
        self.gpu.params.flush(&self.gpu.queue);
        self.gpu.queue.submit(Some(encoder.finish()));
    }
}

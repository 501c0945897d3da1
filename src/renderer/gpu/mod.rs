//! wgpu implementation of the variant compiler, resource pool and command
//! sink consumed by `ModelRenderer`.

mod compiler;
mod instance_buffer;
mod material_buffer;
mod mesh;
mod pipeline_builder;
mod resources;
mod sink;
mod skin_buffer;
mod targets;

pub use compiler::{WgpuProgram, WgpuVariantCompiler};
pub use instance_buffer::InstanceBuffer;
pub use material_buffer::MaterialUniform;
pub use mesh::{GpuMesh, MeshRegistry, ModelVertex, SkinVertex};
pub use pipeline_builder::{blend_state, color_writes, PipelineBuilder};
pub use resources::ModelGpu;
pub use sink::WgpuCommandSink;
pub use skin_buffer::SkinMatrixBuffer;
pub use targets::{
    ColorTarget, DepthTarget, GBuffer, TexturePool, DEPTH_FORMAT, GBUFFER_ALBEDO_FORMAT,
    GBUFFER_NORMAL_FORMAT,
};

use crate::renderer::model_renderer::ModelRenderer;

/// `ModelRenderer` wired to the wgpu backend.
pub type WgpuModelRenderer = ModelRenderer<WgpuVariantCompiler, TexturePool>;

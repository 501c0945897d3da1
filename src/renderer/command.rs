// renderer/command.rs
use crate::renderer::camera::Camera;
use crate::renderer::job::{InstanceData, MeshKey, Pass};
use crate::renderer::lights::LightSet;
use crate::renderer::mask::MaskKey;
use crate::renderer::material::{BlendMode, CullMode, DepthMode, Material};
use crate::renderer::variant::Variant;

/// Fixed-function state for one draw, resolved from the pass and the
/// material's depth/blend/raster policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassState {
    pub pass: Pass,
    pub depth_test: bool,
    pub depth_write: bool,
    pub color_write: bool,
    pub blend: BlendMode,
    pub cull: CullMode,
}

impl PassState {
    pub fn resolve(pass: Pass, material: Option<&Material>) -> Self {
        let (depth, blend, cull) = material
            .map(|m| (m.depth, m.blend, m.cull))
            .unwrap_or_default();

        match pass {
            Pass::Deferred => Self {
                pass,
                depth_test: depth.reads(),
                depth_write: depth.writes(),
                color_write: true,
                blend: BlendMode::Off,
                cull,
            },
            // Tests against the opaque depth only. Writing here would hide
            // farther blended surfaces from the post sweep.
            Pass::AlphaBlendPre => Self {
                pass,
                depth_test: depth != DepthMode::Disabled,
                depth_write: false,
                color_write: false,
                blend: BlendMode::Off,
                cull,
            },
            Pass::AlphaBlendPost => Self {
                pass,
                depth_test: depth != DepthMode::Disabled,
                depth_write: false,
                color_write: true,
                blend,
                cull,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetDesc {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub sample_count: u32,
}

/// Pooled render targets owned outside the renderer.
pub trait ResourcePool {
    type Target;

    fn acquire_color_target(&mut self, desc: &ColorTargetDesc) -> Self::Target;

    fn release(&mut self, target: Self::Target);
}

#[derive(Debug)]
pub enum GroupTarget<'a, T> {
    /// Opaque geometry-buffer targets bound by the sink itself.
    GBuffer,
    Color(&'a T),
}

#[derive(Debug)]
pub struct GroupSetup<'a, T> {
    pub target: GroupTarget<'a, T>,
    pub camera: &'a Camera,
    /// Only set for the blended, forward-lit group.
    pub lights: Option<&'a LightSet>,
    /// Upper bound on instances uploaded before `end_group`.
    pub instance_capacity: usize,
}

/// Receives the dispatcher's bind and draw stream for one group.
pub trait CommandSink {
    type Program;
    type Target;

    fn begin_group(&mut self, setup: GroupSetup<'_, Self::Target>);

    fn bind_variant(&mut self, mask: MaskKey, variant: &Variant<Self::Program>);

    fn bind_material(&mut self, material: Option<&Material>, state: &PassState);

    /// Replaces the per-dispatch instance buffer contents used by the next
    /// `draw_instanced`.
    fn upload_instances(&mut self, instances: &[InstanceData]);

    fn draw_instanced(&mut self, mesh: MeshKey, instance_count: u32);

    fn draw(&mut self, mesh: MeshKey, instance: &InstanceData);

    fn end_group(&mut self);
}

// renderer/gpu/targets.rs
use crate::renderer::command::{ColorTargetDesc, ResourcePool};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const GBUFFER_ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const GBUFFER_NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

fn create_target(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    sample_count: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Scene depth shared by both groups: written by the deferred group, tested
/// by the blended group.
pub struct DepthTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl DepthTarget {
    pub fn new(device: &wgpu::Device, width: u32, height: u32, sample_count: u32) -> Self {
        let (texture, view) =
            create_target(device, "ModelDepth", width, height, DEPTH_FORMAT, sample_count);
        Self { texture, view }
    }
}

/// Geometry buffer written by the deferred group: albedo (rgb) with
/// specular intensity (a), and encoded normal with specular power.
pub struct GBuffer {
    pub albedo: wgpu::TextureView,
    pub normal: wgpu::TextureView,
    textures: [wgpu::Texture; 2],
}

impl GBuffer {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let (albedo_texture, albedo) =
            create_target(device, "GBuffer.Albedo", width, height, GBUFFER_ALBEDO_FORMAT, 1);
        let (normal_texture, normal) =
            create_target(device, "GBuffer.Normal", width, height, GBUFFER_NORMAL_FORMAT, 1);
        Self {
            albedo,
            normal,
            textures: [albedo_texture, normal_texture],
        }
    }

    pub fn size(&self) -> (u32, u32) {
        let size = self.textures[0].size();
        (size.width, size.height)
    }
}

/// Off-screen colour layer the blended group renders into.
#[derive(Debug)]
pub struct ColorTarget {
    pub desc: ColorTargetDesc,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Keeps released colour targets around and hands them back out when a
/// request matches their description.
pub struct TexturePool {
    device: wgpu::Device,
    free: Vec<ColorTarget>,
    created: usize,
}

impl TexturePool {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            device: device.clone(),
            free: Vec::new(),
            created: 0,
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn created_count(&self) -> usize {
        self.created
    }

    /// Drops every pooled target, e.g. after a resize made them stale.
    pub fn purge(&mut self) {
        self.free.clear();
    }
}

impl ResourcePool for TexturePool {
    type Target = ColorTarget;

    fn acquire_color_target(&mut self, desc: &ColorTargetDesc) -> ColorTarget {
        if let Some(index) = self.free.iter().position(|target| target.desc == *desc) {
            return self.free.swap_remove(index);
        }

        log::debug!(
            "Creating pooled colour target {}x{} {:?} x{}",
            desc.width,
            desc.height,
            desc.format,
            desc.sample_count
        );
        let (texture, view) = create_target(
            &self.device,
            "PooledColorTarget",
            desc.width,
            desc.height,
            desc.format,
            desc.sample_count,
        );
        self.created += 1;
        ColorTarget {
            desc: *desc,
            texture,
            view,
        }
    }

    fn release(&mut self, target: ColorTarget) {
        self.free.push(target);
    }
}

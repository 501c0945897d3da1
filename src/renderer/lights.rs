// renderer/lights.rs
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;
pub const MAX_POINT_LIGHTS: usize = 16;
pub const MAX_SPOT_LIGHTS: usize = 8;

#[derive(Clone, Copy, Debug)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
}

/// Active lights for the forward-lit blended pass. Each array is bounded by
/// the uniform layout; extra lights are rejected.
#[derive(Clone, Debug, Default)]
pub struct LightSet {
    directional: Vec<DirectionalLight>,
    point: Vec<PointLight>,
    spot: Vec<SpotLight>,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.directional.clear();
        self.point.clear();
        self.spot.clear();
    }

    /// Returns false when the directional array is full.
    pub fn add_directional(&mut self, light: DirectionalLight) -> bool {
        push_bounded(&mut self.directional, light, MAX_DIRECTIONAL_LIGHTS)
    }

    pub fn add_point(&mut self, light: PointLight) -> bool {
        push_bounded(&mut self.point, light, MAX_POINT_LIGHTS)
    }

    pub fn add_spot(&mut self, light: SpotLight) -> bool {
        push_bounded(&mut self.spot, light, MAX_SPOT_LIGHTS)
    }

    pub fn directional(&self) -> &[DirectionalLight] {
        &self.directional
    }

    pub fn point(&self) -> &[PointLight] {
        &self.point
    }

    pub fn spot(&self) -> &[SpotLight] {
        &self.spot
    }

    pub fn is_empty(&self) -> bool {
        self.directional.is_empty() && self.point.is_empty() && self.spot.is_empty()
    }

    pub fn uniform(&self) -> LightsUniform {
        let mut uniform = LightsUniform::zeroed();
        uniform.counts = [
            self.directional.len() as u32,
            self.point.len() as u32,
            self.spot.len() as u32,
            0,
        ];
        for (dst, light) in uniform.directionals.iter_mut().zip(&self.directional) {
            *dst = GpuDirectionalLight {
                direction: light.direction.extend(0.0).to_array(),
                color_intensity: light.color.extend(light.intensity).to_array(),
            };
        }
        for (dst, light) in uniform.points.iter_mut().zip(&self.point) {
            *dst = GpuPointLight {
                position_range: light.position.extend(light.range).to_array(),
                color_intensity: light.color.extend(light.intensity).to_array(),
            };
        }
        for (dst, light) in uniform.spots.iter_mut().zip(&self.spot) {
            let inner = light.inner_angle.min(light.outer_angle);
            let outer = light.inner_angle.max(light.outer_angle);
            *dst = GpuSpotLight {
                position_range: light.position.extend(light.range).to_array(),
                direction: light.direction.extend(0.0).to_array(),
                color_intensity: light.color.extend(light.intensity).to_array(),
                cone: [inner.cos(), outer.cos(), 0.0, 0.0],
            };
        }
        uniform
    }
}

fn push_bounded<T>(lights: &mut Vec<T>, light: T, max: usize) -> bool {
    if lights.len() >= max {
        log::warn!("Light limit ({}) reached, dropping light", max);
        return false;
    }
    lights.push(light);
    true
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct GpuDirectionalLight {
    pub direction: [f32; 4],
    pub color_intensity: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct GpuPointLight {
    pub position_range: [f32; 4],
    pub color_intensity: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct GpuSpotLight {
    pub position_range: [f32; 4],
    pub direction: [f32; 4],
    pub color_intensity: [f32; 4],
    pub cone: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LightsUniform {
    pub counts: [u32; 4],
    pub directionals: [GpuDirectionalLight; MAX_DIRECTIONAL_LIGHTS],
    pub points: [GpuPointLight; MAX_POINT_LIGHTS],
    pub spots: [GpuSpotLight; MAX_SPOT_LIGHTS],
}

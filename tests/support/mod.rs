#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use model_batch::renderer::{
    Aabb, Camera, ColorTargetDesc, CommandSink, GroupSetup, GroupTarget, InstanceData, LightSet,
    MaskKey, Material, MeshKey, PassState, ResourcePool, StaticJob, Variant, VariantCompiler,
    VariantError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Begin {
        target: Option<u32>,
        lit: bool,
        instance_capacity: usize,
    },
    BindVariant(MaskKey),
    BindMaterial {
        name: Option<String>,
        state: PassState,
    },
    Upload(usize),
    DrawInstanced {
        mesh: MeshKey,
        count: u32,
    },
    Draw {
        mesh: MeshKey,
        x: f32,
    },
    End,
}

/// Captures the dispatcher's command stream.
#[derive(Default)]
pub struct RecordingSink {
    pub commands: Vec<Command>,
}

impl RecordingSink {
    pub fn draws(&self) -> Vec<&Command> {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. } | Command::DrawInstanced { .. }))
            .collect()
    }

    pub fn bound_variants(&self) -> Vec<MaskKey> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BindVariant(mask) => Some(*mask),
                _ => None,
            })
            .collect()
    }

    pub fn instanced_counts(&self) -> Vec<u32> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawInstanced { count, .. } => Some(*count),
                _ => None,
            })
            .collect()
    }
}

impl CommandSink for RecordingSink {
    type Program = MaskKey;
    type Target = u32;

    fn begin_group(&mut self, setup: GroupSetup<'_, u32>) {
        let target = match setup.target {
            GroupTarget::GBuffer => None,
            GroupTarget::Color(id) => Some(*id),
        };
        self.commands.push(Command::Begin {
            target,
            lit: setup.lights.is_some(),
            instance_capacity: setup.instance_capacity,
        });
    }

    fn bind_variant(&mut self, mask: MaskKey, variant: &Variant<MaskKey>) {
        assert_eq!(variant.vertex, mask);
        self.commands.push(Command::BindVariant(mask));
    }

    fn bind_material(&mut self, material: Option<&Material>, state: &PassState) {
        self.commands.push(Command::BindMaterial {
            name: material.map(|m| m.name.clone()),
            state: *state,
        });
    }

    fn upload_instances(&mut self, instances: &[InstanceData]) {
        self.commands.push(Command::Upload(instances.len()));
    }

    fn draw_instanced(&mut self, mesh: MeshKey, instance_count: u32) {
        self.commands.push(Command::DrawInstanced {
            mesh,
            count: instance_count,
        });
    }

    fn draw(&mut self, mesh: MeshKey, instance: &InstanceData) {
        self.commands.push(Command::Draw {
            mesh,
            x: instance.model[3][0],
        });
    }

    fn end_group(&mut self) {
        self.commands.push(Command::End);
    }
}

/// Compiles every mask to itself, failing for masks in `failing`.
#[derive(Default)]
pub struct ScriptedCompiler {
    pub failing: HashSet<MaskKey>,
    pub compiled: Vec<MaskKey>,
    pub attempts: usize,
}

impl VariantCompiler for ScriptedCompiler {
    type Program = MaskKey;

    fn compile(&mut self, mask: MaskKey) -> Result<Variant<MaskKey>, VariantError> {
        self.attempts += 1;
        if self.failing.contains(&mask) {
            return Err(VariantError::Compile {
                mask,
                message: "scripted failure".into(),
            });
        }
        self.compiled.push(mask);
        Ok(Variant {
            vertex: mask,
            pixel: Some(mask),
            layout: None,
        })
    }
}

#[derive(Default)]
pub struct MockPool {
    next: u32,
    pub acquired: Vec<ColorTargetDesc>,
    pub released: Vec<u32>,
}

impl ResourcePool for MockPool {
    type Target = u32;

    fn acquire_color_target(&mut self, desc: &ColorTargetDesc) -> u32 {
        self.acquired.push(*desc);
        self.next += 1;
        self.next
    }

    fn release(&mut self, target: u32) {
        self.released.push(target);
    }
}

pub fn camera() -> Camera {
    Camera::look_at(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::ZERO,
        Vec3::Y,
        std::f32::consts::FRAC_PI_2,
        1.0,
        0.1,
        100.0,
    )
}

pub fn back_buffer(width: u32, height: u32) -> ColorTargetDesc {
    ColorTargetDesc {
        width,
        height,
        format: wgpu::TextureFormat::Rgba8Unorm,
        sample_count: 1,
    }
}

pub fn lights() -> LightSet {
    LightSet::new()
}

pub fn glass(name: &str) -> Arc<Material> {
    Arc::new(Material::new(name).with_blend(model_batch::renderer::BlendMode::Alpha))
}

/// Unit cube job at `x`, sort depth `depth`.
pub fn job(mesh: u64, material: &Option<Arc<Material>>, x: f32, depth: f32) -> StaticJob {
    StaticJob::new(
        MeshKey(mesh),
        material.clone(),
        Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
        Aabb::from_center(Vec3::new(x, 0.0, 0.0), Vec3::splat(0.5)),
    )
    .with_sort_depth(depth)
}

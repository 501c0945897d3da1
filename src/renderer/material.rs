// renderer/material.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use glam::Vec4;

use crate::renderer::mask::MaskKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Diffuse,
    Normal,
    Specular,
    Emissive,
    Occlusion,
}

impl TextureSlot {
    pub const COUNT: usize = 5;
    pub const ALL: [TextureSlot; Self::COUNT] = [
        TextureSlot::Diffuse,
        TextureSlot::Normal,
        TextureSlot::Specular,
        TextureSlot::Emissive,
        TextureSlot::Occlusion,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Shared reference to a texture owned by the asset system. Readiness is
/// published by the loader once the GPU copy exists.
#[derive(Debug, Clone)]
pub struct TextureHandle {
    index: u32,
    ready: Arc<AtomicBool>,
}

impl TextureHandle {
    pub fn pending(index: u32) -> Self {
        Self {
            index,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ready(index: u32) -> Self {
        let handle = Self::pending(index);
        handle.mark_ready();
        handle
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Off,
    Alpha,
    Premultiplied,
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthMode {
    #[default]
    ReadWrite,
    ReadOnly,
    WriteOnly,
    Disabled,
}

impl DepthMode {
    pub fn reads(self) -> bool {
        matches!(self, Self::ReadWrite | Self::ReadOnly)
    }

    pub fn writes(self) -> bool {
        matches!(self, Self::ReadWrite | Self::WriteOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    Back,
    Front,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadingParams {
    pub base_color: Vec4,
    pub specular_power: f32,
    pub emissive_strength: f32,
    pub alpha_cutoff: f32,
}

impl Default for ShadingParams {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            specular_power: 32.0,
            emissive_strength: 0.0,
            alpha_cutoff: 0.0,
        }
    }
}

/// Surface description shared between jobs. Batching compares materials by
/// identity, so jobs must share the same `Arc<Material>` to batch together.
#[derive(Debug, Default)]
pub struct Material {
    pub name: String,
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub cull: CullMode,
    pub params: ShadingParams,
    textures: [Option<TextureHandle>; TextureSlot::COUNT],
    texture_mask: OnceLock<MaskKey>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_depth(mut self, depth: DepthMode) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_cull(mut self, cull: CullMode) -> Self {
        self.cull = cull;
        self
    }

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.params.base_color = color;
        self
    }

    pub fn with_texture(mut self, slot: TextureSlot, texture: TextureHandle) -> Self {
        self.textures[slot.index()] = Some(texture);
        self
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureHandle> {
        self.textures[slot.index()].as_ref()
    }

    pub fn is_blended(&self) -> bool {
        self.blend != BlendMode::Off
    }

    /// Texture-occupancy bits. Only ready textures count. The result is
    /// cached once every bound texture is ready.
    pub fn texture_mask(&self) -> MaskKey {
        if let Some(mask) = self.texture_mask.get() {
            return *mask;
        }

        let mut mask = MaskKey::empty();
        let mut settled = true;
        for slot in TextureSlot::ALL {
            if let Some(texture) = self.texture(slot) {
                if texture.is_ready() {
                    mask |= MaskKey::for_texture_slot(slot);
                } else {
                    settled = false;
                }
            }
        }

        if settled {
            let _ = self.texture_mask.set(mask);
        }
        mask
    }
}

/// Identity of a material for batching; `None` stands for the default
/// opaque appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialKey(usize);

impl MaterialKey {
    pub const DEFAULT: Self = Self(0);

    pub fn of(material: Option<&Arc<Material>>) -> Self {
        match material {
            Some(material) => Self(Arc::as_ptr(material) as usize),
            None => Self::DEFAULT,
        }
    }

    /// Same key as `of` for a material borrowed out of its `Arc`.
    pub fn of_ref(material: Option<&Material>) -> Self {
        match material {
            Some(material) => Self(material as *const Material as usize),
            None => Self::DEFAULT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrowed_and_shared_keys_agree() {
        let material = Arc::new(Material::new("stone"));
        assert_eq!(
            MaterialKey::of(Some(&material)),
            MaterialKey::of_ref(Some(&*material))
        );
        assert_eq!(MaterialKey::of_ref(None), MaterialKey::DEFAULT);
    }

    #[test]
    fn untextured_material_has_empty_mask() {
        assert_eq!(Material::new("plain").texture_mask(), MaskKey::empty());
    }

    #[test]
    fn pending_textures_do_not_count_until_ready() {
        let diffuse = TextureHandle::pending(3);
        let material = Material::new("late")
            .with_texture(TextureSlot::Diffuse, diffuse.clone())
            .with_texture(TextureSlot::Normal, TextureHandle::ready(4));

        assert_eq!(material.texture_mask(), MaskKey::NORMAL_MAP);

        diffuse.mark_ready();
        assert_eq!(
            material.texture_mask(),
            MaskKey::DIFFUSE_MAP | MaskKey::NORMAL_MAP
        );
    }

    #[test]
    fn material_key_is_identity_based() {
        let a = Arc::new(Material::new("same"));
        let b = Arc::new(Material::new("same"));
        assert_eq!(MaterialKey::of(Some(&a)), MaterialKey::of(Some(&a.clone())));
        assert_ne!(MaterialKey::of(Some(&a)), MaterialKey::of(Some(&b)));
        assert_eq!(MaterialKey::of(None), MaterialKey::DEFAULT);
    }

    #[test]
    fn depth_modes_split_read_and_write() {
        assert!(DepthMode::ReadOnly.reads() && !DepthMode::ReadOnly.writes());
        assert!(!DepthMode::WriteOnly.reads() && DepthMode::WriteOnly.writes());
        assert!(!DepthMode::Disabled.reads() && !DepthMode::Disabled.writes());
    }
}

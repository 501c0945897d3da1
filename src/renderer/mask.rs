// renderer/mask.rs
use bitflags::bitflags;

use crate::renderer::job::Group;
use crate::renderer::material::TextureSlot;

bitflags! {
    /// Shader features a draw needs. Equal masks always share one compiled variant.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
    pub struct MaskKey: u32 {
        const DIFFUSE_MAP = 1 << 0;
        const NORMAL_MAP = 1 << 1;
        const SPECULAR_MAP = 1 << 2;
        const EMISSIVE_MAP = 1 << 3;
        const OCCLUSION_MAP = 1 << 4;

        const USE_INSTANCING = 1 << 8;
        const USE_SKINNING = 1 << 9;
        const USE_ALPHA_BLENDING = 1 << 10;
    }
}

/// Symbolic name for every mask bit, consumed by pipeline construction.
pub const FEATURE_TABLE: [(MaskKey, &str); 8] = [
    (MaskKey::DIFFUSE_MAP, "USE_DIFFUSE_MAP"),
    (MaskKey::NORMAL_MAP, "USE_NORMAL_MAP"),
    (MaskKey::SPECULAR_MAP, "USE_SPECULAR_MAP"),
    (MaskKey::EMISSIVE_MAP, "USE_EMISSIVE_MAP"),
    (MaskKey::OCCLUSION_MAP, "USE_OCCLUSION_MAP"),
    (MaskKey::USE_INSTANCING, "USE_INSTANCING"),
    (MaskKey::USE_SKINNING, "USE_SKINNING"),
    (MaskKey::USE_ALPHA_BLENDING, "USE_ALPHA_BLENDING"),
];

impl MaskKey {
    pub const TEXTURE_BITS: Self = Self::DIFFUSE_MAP
        .union(Self::NORMAL_MAP)
        .union(Self::SPECULAR_MAP)
        .union(Self::EMISSIVE_MAP)
        .union(Self::OCCLUSION_MAP);

    pub const fn for_texture_slot(slot: TextureSlot) -> Self {
        match slot {
            TextureSlot::Diffuse => Self::DIFFUSE_MAP,
            TextureSlot::Normal => Self::NORMAL_MAP,
            TextureSlot::Specular => Self::SPECULAR_MAP,
            TextureSlot::Emissive => Self::EMISSIVE_MAP,
            TextureSlot::Occlusion => Self::OCCLUSION_MAP,
        }
    }

    /// Combines a material's texture occupancy with the per-batch decisions.
    /// Non-texture bits in `textures` are ignored.
    pub fn derive(textures: MaskKey, instanced: bool, skinned: bool, group: Group) -> Self {
        let mut mask = textures & Self::TEXTURE_BITS;
        if instanced {
            mask |= Self::USE_INSTANCING;
        }
        if skinned {
            mask |= Self::USE_SKINNING;
        }
        if group == Group::AlphaBlend {
            mask |= Self::USE_ALPHA_BLENDING;
        }
        mask
    }

    pub fn texture_bits(self) -> Self {
        self & Self::TEXTURE_BITS
    }

    pub fn is_instanced(self) -> bool {
        self.contains(Self::USE_INSTANCING)
    }

    pub fn is_skinned(self) -> bool {
        self.contains(Self::USE_SKINNING)
    }

    pub fn is_alpha_blended(self) -> bool {
        self.contains(Self::USE_ALPHA_BLENDING)
    }

    /// Feature names for every set bit, in table order.
    pub fn feature_names(self) -> impl Iterator<Item = &'static str> {
        FEATURE_TABLE
            .into_iter()
            .filter(move |(bit, _)| self.contains(*bit))
            .map(|(_, name)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn feature_table_covers_every_bit_once() {
        let mut seen = MaskKey::empty();
        for (bit, _) in FEATURE_TABLE {
            assert_eq!(bit.bits().count_ones(), 1);
            assert!(!seen.intersects(bit), "bit {bit:?} listed twice");
            seen |= bit;
        }
        assert_eq!(seen, MaskKey::all());
    }

    #[test]
    fn derive_is_deterministic() {
        let textures = MaskKey::DIFFUSE_MAP | MaskKey::NORMAL_MAP;
        let a = MaskKey::derive(textures, true, false, Group::Deferred);
        let b = MaskKey::derive(textures, true, false, Group::Deferred);
        assert_eq!(a, b);
        assert_eq!(
            a,
            MaskKey::DIFFUSE_MAP | MaskKey::NORMAL_MAP | MaskKey::USE_INSTANCING
        );
    }

    #[test]
    fn distinct_feature_combinations_never_collide() {
        let texture_sets = [
            MaskKey::empty(),
            MaskKey::DIFFUSE_MAP,
            MaskKey::DIFFUSE_MAP | MaskKey::SPECULAR_MAP,
            MaskKey::TEXTURE_BITS,
        ];
        let mut masks = HashSet::new();
        let mut combos = 0;
        for textures in texture_sets {
            for instanced in [false, true] {
                for skinned in [false, true] {
                    for group in [Group::Deferred, Group::AlphaBlend] {
                        masks.insert(MaskKey::derive(textures, instanced, skinned, group));
                        combos += 1;
                    }
                }
            }
        }
        assert_eq!(masks.len(), combos);
    }

    #[test]
    fn derive_drops_non_texture_bits_from_material_mask() {
        let mask = MaskKey::derive(
            MaskKey::DIFFUSE_MAP | MaskKey::USE_SKINNING,
            false,
            false,
            Group::Deferred,
        );
        assert_eq!(mask, MaskKey::DIFFUSE_MAP);
    }

    #[test]
    fn feature_names_follow_set_bits() {
        let mask = MaskKey::NORMAL_MAP | MaskKey::USE_SKINNING;
        let names: Vec<_> = mask.feature_names().collect();
        assert_eq!(names, ["USE_NORMAL_MAP", "USE_SKINNING"]);
    }
}

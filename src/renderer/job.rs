// renderer/job.rs
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::renderer::job_store::{GroupJobs, JobArray};
use crate::renderer::material::Material;
use crate::renderer::skin::SkinTableId;

/// Opaque identity of a mesh's GPU buffers. Only compared for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshKey(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Deferred,
    AlphaBlend,
}

impl Group {
    pub const ALL: [Group; 2] = [Group::Deferred, Group::AlphaBlend];

    pub fn for_material(material: Option<&Material>) -> Self {
        match material {
            Some(material) if material.is_blended() => Group::AlphaBlend,
            _ => Group::Deferred,
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    Deferred,
    AlphaBlendPre,
    AlphaBlendPost,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

/// Per-instance payload uploaded for both instanced and individual draws.
/// Static jobs carry `SkinTableId::NONE`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq)]
pub struct InstanceData {
    pub model: [[f32; 4]; 4],
    pub skin_table: u32,
    pub _padding: [u32; 3],
}

impl InstanceData {
    pub fn new(world: &Mat4, skin_table: SkinTableId) -> Self {
        Self {
            model: world.to_cols_array_2d(),
            skin_table: skin_table.raw(),
            _padding: [0; 3],
        }
    }

    pub fn skin_table(&self) -> SkinTableId {
        SkinTableId::from_raw(self.skin_table)
    }
}

pub trait JobKind: Copy + Send + Sync + 'static {
    const SKINNED: bool;

    fn skin_table(&self) -> SkinTableId;

    /// The stream of this kind inside a group's storage.
    fn stream(jobs: &mut GroupJobs) -> &mut JobArray<Self>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Static;

#[derive(Debug, Clone, Copy)]
pub struct Skinned {
    pub skin_table: SkinTableId,
}

impl JobKind for Static {
    const SKINNED: bool = false;

    fn skin_table(&self) -> SkinTableId {
        SkinTableId::NONE
    }

    fn stream(jobs: &mut GroupJobs) -> &mut JobArray<Self> {
        &mut jobs.statics
    }
}

impl JobKind for Skinned {
    const SKINNED: bool = true;

    fn skin_table(&self) -> SkinTableId {
        self.skin_table
    }

    fn stream(jobs: &mut GroupJobs) -> &mut JobArray<Self> {
        &mut jobs.skinned
    }
}

/// One "draw this mesh with this material here" request for the current frame.
#[derive(Debug, Clone)]
pub struct RenderJob<K: JobKind> {
    pub mesh: MeshKey,
    pub material: Option<Arc<Material>>,
    pub world: Mat4,
    pub sort_depth: f32,
    pub bounds: Aabb,
    pub kind: K,
    pub(crate) culled: bool,
}

pub type StaticJob = RenderJob<Static>;
pub type SkinnedJob = RenderJob<Skinned>;

impl<K: JobKind> RenderJob<K> {
    pub fn group(&self) -> Group {
        Group::for_material(self.material.as_deref())
    }

    pub fn is_culled(&self) -> bool {
        self.culled
    }

    pub fn instance(&self) -> InstanceData {
        InstanceData::new(&self.world, self.kind.skin_table())
    }

    pub fn with_sort_depth(mut self, depth: f32) -> Self {
        self.sort_depth = depth;
        self
    }
}

impl StaticJob {
    pub fn new(mesh: MeshKey, material: Option<Arc<Material>>, world: Mat4, bounds: Aabb) -> Self {
        Self {
            mesh,
            material,
            world,
            sort_depth: 0.0,
            bounds,
            kind: Static,
            culled: false,
        }
    }
}

impl SkinnedJob {
    pub fn new(
        mesh: MeshKey,
        material: Option<Arc<Material>>,
        world: Mat4,
        bounds: Aabb,
        skin_table: SkinTableId,
    ) -> Self {
        Self {
            mesh,
            material,
            world,
            sort_depth: 0.0,
            bounds,
            kind: Skinned { skin_table },
            culled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::material::BlendMode;

    #[test]
    fn group_follows_material_blend() {
        assert_eq!(Group::for_material(None), Group::Deferred);
        assert_eq!(
            Group::for_material(Some(&Material::new("opaque"))),
            Group::Deferred
        );
        assert_eq!(
            Group::for_material(Some(&Material::new("glass").with_blend(BlendMode::Alpha))),
            Group::AlphaBlend
        );
    }

    #[test]
    fn instance_data_is_80_bytes() {
        // mat4x4<f32> + u32 + padding to 16 bytes
        assert_eq!(std::mem::size_of::<InstanceData>(), 80);
    }

    #[test]
    fn static_instances_carry_no_skin_table() {
        let job = StaticJob::new(
            MeshKey(1),
            None,
            Mat4::from_translation(Vec3::X),
            Aabb::from_center(Vec3::X, Vec3::ONE),
        );
        assert_eq!(job.instance().skin_table(), SkinTableId::NONE);
        assert_eq!(job.instance().model, Mat4::from_translation(Vec3::X).to_cols_array_2d());
    }
}

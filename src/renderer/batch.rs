// renderer/batch.rs
use std::collections::HashMap;
use std::sync::Arc;

use crate::renderer::job::{Group, InstanceData, JobKind, MeshKey, RenderJob};
use crate::renderer::job_store::GroupJobs;
use crate::renderer::mask::MaskKey;
use crate::renderer::material::{Material, MaterialKey};

/// Jobs sharing (material, mesh) within one stream for the current frame.
#[derive(Debug)]
pub struct JobBatch {
    pub material: Option<Arc<Material>>,
    pub material_key: MaterialKey,
    pub mesh: MeshKey,
    pub skinned: bool,
    pub mask: MaskKey,
    pub instances: Vec<InstanceData>,
    pub depths: Vec<f32>,
}

impl JobBatch {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

struct MaterialEntry {
    texture_mask: MaskKey,
    meshes: HashMap<MeshKey, usize>,
}

/// Groups surviving jobs by material then mesh, assigns each batch its mask
/// and regroups batches by mask. Everything is rebuilt every frame.
#[derive(Default)]
pub struct Batcher {
    materials: HashMap<MaterialKey, MaterialEntry>,
    batches: Vec<JobBatch>,
    by_mask: HashMap<MaskKey, Vec<usize>>,
}

impl Batcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&mut self, group: Group, jobs: &GroupJobs) {
        self.clear();
        self.collect(jobs.statics.as_slice());
        // Skinned batches never merge with static ones even for the same mesh.
        self.materials.clear();
        self.collect(jobs.skinned.as_slice());
        self.materials.clear();
        self.assign_masks(group);
    }

    fn collect<K: JobKind>(&mut self, jobs: &[RenderJob<K>]) {
        for job in jobs.iter().filter(|job| !job.is_culled()) {
            let material_key = MaterialKey::of(job.material.as_ref());
            let entry = self
                .materials
                .entry(material_key)
                .or_insert_with(|| MaterialEntry {
                    texture_mask: job
                        .material
                        .as_deref()
                        .map(Material::texture_mask)
                        .unwrap_or_default(),
                    meshes: HashMap::new(),
                });

            match entry.meshes.get(&job.mesh) {
                Some(&index) => {
                    let batch = &mut self.batches[index];
                    batch.instances.push(job.instance());
                    batch.depths.push(job.sort_depth);
                }
                None => {
                    entry.meshes.insert(job.mesh, self.batches.len());
                    self.batches.push(JobBatch {
                        material: job.material.clone(),
                        material_key,
                        mesh: job.mesh,
                        skinned: K::SKINNED,
                        // Texture bits only until `assign_masks` runs.
                        mask: entry.texture_mask,
                        instances: vec![job.instance()],
                        depths: vec![job.sort_depth],
                    });
                }
            }
        }
    }

    fn assign_masks(&mut self, group: Group) {
        for (index, batch) in self.batches.iter_mut().enumerate() {
            // Blended surfaces are always drawn one by one in depth order.
            let instanced = group == Group::Deferred && batch.len() > 1;
            batch.mask = MaskKey::derive(batch.mask, instanced, batch.skinned, group);
            self.by_mask.entry(batch.mask).or_default().push(index);
        }
    }

    pub fn batches(&self) -> &[JobBatch] {
        &self.batches
    }

    pub fn batch(&self, index: usize) -> &JobBatch {
        &self.batches[index]
    }

    /// Batch indices per mask, in hash order.
    pub fn mask_groups(&self) -> impl Iterator<Item = (MaskKey, &[usize])> {
        self.by_mask
            .iter()
            .map(|(mask, indices)| (*mask, indices.as_slice()))
    }

    /// Mask groups sorted by mask value, batches sorted by material identity
    /// then mesh.
    pub fn sorted_mask_groups(&self) -> Vec<(MaskKey, Vec<usize>)> {
        let mut groups: Vec<(MaskKey, Vec<usize>)> = self
            .by_mask
            .iter()
            .map(|(mask, indices)| (*mask, indices.clone()))
            .collect();
        groups.sort_by_key(|(mask, _)| *mask);
        for (_, indices) in &mut groups {
            indices.sort_by_key(|&index| {
                let batch = &self.batches[index];
                (batch.material_key, batch.mesh, batch.skinned)
            });
        }
        groups
    }

    pub fn instance_count(&self) -> usize {
        self.batches.iter().map(JobBatch::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn clear(&mut self) {
        self.materials.clear();
        self.batches.clear();
        self.by_mask.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::job::{Aabb, SkinnedJob, StaticJob};
    use crate::renderer::job_store::JobStore;
    use crate::renderer::material::{BlendMode, TextureHandle, TextureSlot};
    use crate::renderer::skin::SkinTableId;
    use glam::{Mat4, Vec3};

    fn push(store: &JobStore, mesh: u64, material: &Option<Arc<Material>>, x: f32) {
        store.push(
            StaticJob::new(
                MeshKey(mesh),
                material.clone(),
                Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
                Aabb::from_center(Vec3::ZERO, Vec3::ONE),
            )
            .with_sort_depth(x),
        );
    }

    fn build(store: &mut JobStore, group: Group) -> Batcher {
        let mut batcher = Batcher::new();
        batcher.build(group, store.group_mut(group));
        batcher
    }

    #[test]
    fn identical_material_and_mesh_share_a_batch() {
        let mut store = JobStore::new(8);
        let stone = Some(Arc::new(Material::new("stone")));
        let other = Some(Arc::new(Material::new("stone")));
        for i in 0..4 {
            push(&store, 1, &stone, i as f32);
        }
        push(&store, 2, &stone, 0.0);
        push(&store, 1, &other, 0.0);

        let batcher = build(&mut store, Group::Deferred);
        let mut sizes: Vec<usize> = batcher.batches().iter().map(JobBatch::len).collect();
        sizes.sort_unstable();

        assert_eq!(sizes, [1, 1, 4]);
        assert_eq!(batcher.instance_count(), 6);
    }

    #[test]
    fn masks_reflect_instancing_and_textures() {
        let mut store = JobStore::new(8);
        let textured = Some(Arc::new(
            Material::new("brick").with_texture(TextureSlot::Diffuse, TextureHandle::ready(0)),
        ));
        push(&store, 1, &textured, 0.0);
        push(&store, 1, &textured, 1.0);
        push(&store, 2, &None, 0.0);

        let batcher = build(&mut store, Group::Deferred);
        let masks: Vec<MaskKey> = batcher.sorted_mask_groups().into_iter().map(|(m, _)| m).collect();

        assert_eq!(
            masks,
            [
                MaskKey::empty(),
                MaskKey::DIFFUSE_MAP | MaskKey::USE_INSTANCING
            ]
        );
    }

    #[test]
    fn alpha_batches_are_never_instanced() {
        let mut store = JobStore::new(8);
        let glass = Some(Arc::new(Material::new("glass").with_blend(BlendMode::Alpha)));
        for i in 0..3 {
            push(&store, 1, &glass, i as f32);
        }

        let batcher = build(&mut store, Group::AlphaBlend);
        assert_eq!(batcher.batches().len(), 1);
        assert_eq!(batcher.batch(0).mask, MaskKey::USE_ALPHA_BLENDING);
    }

    #[test]
    fn skinned_stream_batches_separately() {
        let mut store = JobStore::new(8);
        push(&store, 1, &None, 0.0);
        store.push(SkinnedJob::new(
            MeshKey(1),
            None,
            Mat4::IDENTITY,
            Aabb::from_center(Vec3::ZERO, Vec3::ONE),
            SkinTableId::from_raw(12),
        ));

        let batcher = build(&mut store, Group::Deferred);
        let skinned: Vec<&JobBatch> = batcher.batches().iter().filter(|b| b.skinned).collect();

        assert_eq!(batcher.batches().len(), 2);
        assert_eq!(skinned.len(), 1);
        assert_eq!(skinned[0].mask, MaskKey::USE_SKINNING);
        assert_eq!(skinned[0].instances[0].skin_table().raw(), 12);
    }

    #[test]
    fn culled_jobs_are_skipped() {
        let mut store = JobStore::new(8);
        push(&store, 1, &None, 0.0);
        push(&store, 1, &None, 1.0);
        store.group_mut(Group::Deferred).statics.as_mut_slice()[0].culled = true;

        let batcher = build(&mut store, Group::Deferred);
        assert_eq!(batcher.instance_count(), 1);
        assert_eq!(batcher.batch(0).mask, MaskKey::empty());
    }
}

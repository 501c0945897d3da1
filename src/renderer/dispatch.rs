// renderer/dispatch.rs
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::renderer::batch::{Batcher, JobBatch};
use crate::renderer::camera::Camera;
use crate::renderer::command::{
    ColorTargetDesc, CommandSink, GroupSetup, GroupTarget, PassState, ResourcePool,
};
use crate::renderer::job::{Group, Pass};
use crate::renderer::lights::LightSet;
use crate::renderer::mask::MaskKey;
use crate::renderer::material::MaterialKey;
use crate::renderer::variant::{VariantCompiler, VariantTable};
use crate::renderer::visibility::OcclusionTester;

/// External per-frame inputs handed to `render`.
pub struct FrameContext<'a> {
    pub camera: &'a Camera,
    pub lights: &'a LightSet,
    pub occlusion: &'a dyn OcclusionTester,
    pub back_buffer: ColorTargetDesc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub batches: usize,
    pub culled_jobs: usize,
    pub variant_binds: usize,
    pub instanced_draws: usize,
    pub individual_draws: usize,
    pub skipped_batches: usize,
    pub compile_failures: usize,
}

impl DispatchStats {
    pub fn draw_calls(&self) -> usize {
        self.instanced_draws + self.individual_draws
    }
}

/// One individually drawn instance, ordered by camera depth.
#[derive(Debug, Clone, Copy)]
struct SortedDraw {
    depth: f32,
    batch: usize,
    instance: usize,
}

fn by_depth(a: &SortedDraw, b: &SortedDraw) -> Ordering {
    a.depth.total_cmp(&b.depth)
}

/// Turns a built `Batcher` into sink commands for one group.
pub struct Dispatcher<T> {
    max_instancing: usize,
    deterministic: bool,
    color_target: Option<(ColorTargetDesc, T)>,
    sorted: Vec<SortedDraw>,
}

impl<T> Dispatcher<T> {
    pub fn new(max_instancing: usize, deterministic: bool) -> Self {
        Self {
            max_instancing: max_instancing.max(1),
            deterministic,
            color_target: None,
            sorted: Vec::new(),
        }
    }

    pub fn max_instancing(&self) -> usize {
        self.max_instancing
    }

    #[allow(clippy::too_many_arguments)]
    pub fn dispatch<C, P, S>(
        &mut self,
        group: Group,
        batcher: &Batcher,
        variants: &mut VariantTable<C::Program>,
        compiler: &mut C,
        pool: &mut P,
        frame: &FrameContext<'_>,
        sink: &mut S,
    ) -> DispatchStats
    where
        C: VariantCompiler,
        P: ResourcePool<Target = T>,
        S: CommandSink<Program = C::Program, Target = T>,
    {
        let mut stats = DispatchStats {
            batches: batcher.batches().len(),
            ..Default::default()
        };
        if batcher.is_empty() {
            return stats;
        }

        match group {
            Group::Deferred => {
                sink.begin_group(GroupSetup {
                    target: GroupTarget::GBuffer,
                    camera: frame.camera,
                    lights: None,
                    instance_capacity: batcher.instance_count(),
                });
                self.dispatch_deferred(batcher, variants, compiler, sink, &mut stats);
            }
            Group::AlphaBlend => {
                self.acquire_color_target(pool, frame.back_buffer);
                let Some((_, target)) = self.color_target.as_ref() else {
                    return stats;
                };
                sink.begin_group(GroupSetup {
                    target: GroupTarget::Color(target),
                    camera: frame.camera,
                    lights: Some(frame.lights),
                    instance_capacity: batcher.instance_count() * 2,
                });
                self.dispatch_blended(batcher, variants, compiler, sink, &mut stats);
            }
        }
        sink.end_group();

        log::trace!("{:?} dispatch: {:?}", group, stats);
        stats
    }

    /// Reuses the previous pooled target while the back buffer is unchanged.
    fn acquire_color_target<P>(&mut self, pool: &mut P, desc: ColorTargetDesc)
    where
        P: ResourcePool<Target = T>,
    {
        match self.color_target.take() {
            Some((current, target)) if current == desc => {
                self.color_target = Some((current, target));
            }
            previous => {
                if let Some((_, target)) = previous {
                    log::debug!("Back buffer changed, re-acquiring blend target {:?}", desc);
                    pool.release(target);
                }
                self.color_target = Some((desc, pool.acquire_color_target(&desc)));
            }
        }
    }

    pub fn release_targets<P>(&mut self, pool: &mut P)
    where
        P: ResourcePool<Target = T>,
    {
        if let Some((_, target)) = self.color_target.take() {
            pool.release(target);
        }
    }

    fn dispatch_deferred<C, S>(
        &mut self,
        batcher: &Batcher,
        variants: &mut VariantTable<C::Program>,
        compiler: &mut C,
        sink: &mut S,
        stats: &mut DispatchStats,
    ) where
        C: VariantCompiler,
        S: CommandSink<Program = C::Program>,
    {
        let groups: Vec<(MaskKey, Vec<usize>)> = if self.deterministic {
            batcher.sorted_mask_groups()
        } else {
            batcher
                .mask_groups()
                .map(|(mask, indices)| (mask, indices.to_vec()))
                .collect()
        };

        for (mask, indices) in groups {
            let variant = match variants.resolve(mask, compiler) {
                Ok(variant) => variant,
                Err(err) => {
                    log::error!("{}; skipping {} batches this frame", err, indices.len());
                    stats.compile_failures += 1;
                    stats.skipped_batches += indices.len();
                    continue;
                }
            };
            sink.bind_variant(mask, variant);
            stats.variant_binds += 1;

            if mask.is_instanced() {
                for &index in &indices {
                    self.draw_instanced(batcher.batch(index), sink, stats);
                }
            } else {
                self.sorted.clear();
                self.sorted.extend(indices.iter().flat_map(|&batch| {
                    batcher.batch(batch).depths.iter().enumerate().map(
                        move |(instance, &depth)| SortedDraw {
                            depth,
                            batch,
                            instance,
                        },
                    )
                }));
                self.sorted.sort_by(by_depth);
                let mut bound = None;
                for draw in &self.sorted {
                    draw_sorted(batcher, draw, Pass::Deferred, &mut bound, sink, stats);
                }
            }
        }
    }

    fn draw_instanced<S: CommandSink>(
        &self,
        batch: &JobBatch,
        sink: &mut S,
        stats: &mut DispatchStats,
    ) {
        sink.bind_material(
            batch.material.as_deref(),
            &PassState::resolve(Pass::Deferred, batch.material.as_deref()),
        );
        for chunk in batch.instances.chunks(self.max_instancing) {
            sink.upload_instances(chunk);
            sink.draw_instanced(batch.mesh, chunk.len() as u32);
            stats.instanced_draws += 1;
        }
    }

    /// Every blended instance across all masks and both streams is sorted
    /// near to far once; the pre and post sweeps then walk the same order.
    fn dispatch_blended<C, S>(
        &mut self,
        batcher: &Batcher,
        variants: &mut VariantTable<C::Program>,
        compiler: &mut C,
        sink: &mut S,
        stats: &mut DispatchStats,
    ) where
        C: VariantCompiler,
        S: CommandSink<Program = C::Program>,
    {
        self.sorted.clear();
        for (batch_index, batch) in batcher.batches().iter().enumerate() {
            self.sorted
                .extend(batch.depths.iter().enumerate().map(|(instance, &depth)| SortedDraw {
                    depth,
                    batch: batch_index,
                    instance,
                }));
        }
        // Stable: equal depths keep submission order.
        self.sorted.sort_by(by_depth);

        let mut failed: HashSet<MaskKey> = HashSet::new();
        for pass in [Pass::AlphaBlendPre, Pass::AlphaBlendPost] {
            let mut current: Option<MaskKey> = None;
            let mut bound = None;

            for draw in &self.sorted {
                let mask = batcher.batch(draw.batch).mask;
                if failed.contains(&mask) {
                    continue;
                }
                if current != Some(mask) {
                    match variants.resolve(mask, compiler) {
                        Ok(variant) => {
                            sink.bind_variant(mask, variant);
                            stats.variant_binds += 1;
                            current = Some(mask);
                            bound = None;
                        }
                        Err(err) => {
                            log::error!("{}; skipping blended draws this frame", err);
                            failed.insert(mask);
                            stats.compile_failures += 1;
                            stats.skipped_batches += batcher
                                .batches()
                                .iter()
                                .filter(|batch| batch.mask == mask)
                                .count();
                            continue;
                        }
                    }
                }
                draw_sorted(batcher, draw, pass, &mut bound, sink, stats);
            }
        }
    }
}

/// Draws one instance, re-binding the material only when it changes.
fn draw_sorted<S: CommandSink>(
    batcher: &Batcher,
    draw: &SortedDraw,
    pass: Pass,
    bound: &mut Option<MaterialKey>,
    sink: &mut S,
    stats: &mut DispatchStats,
) {
    let batch = batcher.batch(draw.batch);
    if *bound != Some(batch.material_key) {
        let material = batch.material.as_deref();
        sink.bind_material(material, &PassState::resolve(pass, material));
        *bound = Some(batch.material_key);
    }
    sink.draw(batch.mesh, &batch.instances[draw.instance]);
    stats.individual_draws += 1;
}

// renderer/model_renderer.rs
use crate::renderer::batch::Batcher;
use crate::renderer::command::{CommandSink, ResourcePool};
use crate::renderer::dispatch::{DispatchStats, Dispatcher, FrameContext};
use crate::renderer::job::{Group, JobKind, RenderJob};
use crate::renderer::job_store::{JobCounts, JobStore};
use crate::renderer::variant::{VariantCompiler, VariantTable};
use crate::renderer::visibility::cull_jobs;
use crate::settings::BatchSettings;

/// Collects draw jobs from any thread during a frame and turns them into
/// batched, instanced draw commands on `render`.
///
/// Frame protocol: `push_job` from producers, `render` once per group, then
/// `cleanup` before the next frame's submissions.
pub struct ModelRenderer<C: VariantCompiler, P: ResourcePool> {
    settings: BatchSettings,
    jobs: JobStore,
    batcher: Batcher,
    dispatcher: Dispatcher<P::Target>,
    variants: VariantTable<C::Program>,
    compiler: C,
    pool: P,
}

impl<C: VariantCompiler, P: ResourcePool> ModelRenderer<C, P> {
    pub fn new(settings: BatchSettings, compiler: C, pool: P) -> Self {
        let settings = settings.validate();
        log::info!(
            "Model renderer: instancing limit {}, initial job capacity {}, culling {}",
            settings.max_instancing_count,
            settings.initial_job_capacity,
            if settings.occlusion_culling { "on" } else { "off" }
        );

        Self {
            jobs: JobStore::new(settings.initial_job_capacity),
            batcher: Batcher::new(),
            dispatcher: Dispatcher::new(
                settings.max_instancing_count,
                settings.deterministic_order,
            ),
            variants: VariantTable::new(),
            compiler,
            pool,
            settings,
        }
    }

    /// Thread-safe; the job's material picks its group.
    pub fn push_job<K: JobKind>(&self, job: RenderJob<K>) {
        self.jobs.push(job);
    }

    pub fn render<S>(
        &mut self,
        group: Group,
        frame: &FrameContext<'_>,
        sink: &mut S,
    ) -> DispatchStats
    where
        S: CommandSink<Program = C::Program, Target = P::Target>,
    {
        let jobs = self.jobs.group_mut(group);
        if jobs.is_empty() {
            return DispatchStats::default();
        }

        let mut culled = 0;
        // Blended surfaces are never culled.
        if group == Group::Deferred && self.settings.occlusion_culling {
            culled += cull_jobs(jobs.statics.as_mut_slice(), frame.occlusion);
            culled += cull_jobs(jobs.skinned.as_mut_slice(), frame.occlusion);
        }

        self.batcher.build(group, jobs);
        let mut stats = self.dispatcher.dispatch(
            group,
            &self.batcher,
            &mut self.variants,
            &mut self.compiler,
            &mut self.pool,
            frame,
            sink,
        );
        stats.culled_jobs = culled;
        self.batcher.clear();
        stats
    }

    /// Drops this frame's jobs; array capacity is kept for the next frame.
    pub fn cleanup(&mut self) {
        self.jobs.clear();
        self.batcher.clear();
    }

    /// Hands pooled targets back, e.g. before the pool itself is recreated.
    pub fn release_targets(&mut self) {
        self.dispatcher.release_targets(&mut self.pool);
    }

    pub fn job_counts(&self, group: Group) -> JobCounts {
        self.jobs.counts(group)
    }

    pub fn job_capacities(&self, group: Group) -> JobCounts {
        self.jobs.capacities(group)
    }

    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn compiler_mut(&mut self) -> &mut C {
        &mut self.compiler
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }
}

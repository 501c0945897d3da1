// renderer/job_store.rs
use parking_lot::RwLock;

use crate::renderer::job::{Group, JobKind, RenderJob, Skinned, Static};

/// Growable per-frame job array. Capacity doubles when full and is never
/// released between frames.
#[derive(Debug)]
pub struct JobArray<K: JobKind> {
    jobs: Vec<RenderJob<K>>,
}

impl<K: JobKind> JobArray<K> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, mut job: RenderJob<K>) {
        if self.jobs.len() == self.jobs.capacity() {
            let grow_by = self.jobs.capacity().max(1);
            log::debug!(
                "Growing {} job array: {} -> {}",
                if K::SKINNED { "skinned" } else { "static" },
                self.jobs.capacity(),
                self.jobs.capacity() + grow_by
            );
            self.jobs.reserve_exact(grow_by);
        }
        job.culled = false;
        self.jobs.push(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.jobs.capacity()
    }

    pub fn as_slice(&self) -> &[RenderJob<K>] {
        &self.jobs
    }

    pub fn as_mut_slice(&mut self) -> &mut [RenderJob<K>] {
        &mut self.jobs
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}

#[derive(Debug)]
pub struct GroupJobs {
    pub statics: JobArray<Static>,
    pub skinned: JobArray<Skinned>,
}

impl GroupJobs {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            statics: JobArray::with_capacity(capacity),
            skinned: JobArray::with_capacity(capacity),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statics.is_empty() && self.skinned.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobCounts {
    pub statics: usize,
    pub skinned: usize,
}

/// Per-group job storage. Producers append under the group's write lock;
/// the render thread reads through `&mut self` after the frame join.
#[derive(Debug)]
pub struct JobStore {
    groups: [RwLock<GroupJobs>; 2],
}

impl JobStore {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            groups: [
                RwLock::new(GroupJobs::with_capacity(initial_capacity)),
                RwLock::new(GroupJobs::with_capacity(initial_capacity)),
            ],
        }
    }

    /// Appends under the owning group's write lock.
    pub fn push<K: JobKind>(&self, job: RenderJob<K>) {
        let group = job.group();
        let mut jobs = self.groups[group.index()].write();
        K::stream(&mut jobs).push(job);
    }

    pub fn counts(&self, group: Group) -> JobCounts {
        let jobs = self.groups[group.index()].read();
        JobCounts {
            statics: jobs.statics.len(),
            skinned: jobs.skinned.len(),
        }
    }

    pub fn capacities(&self, group: Group) -> JobCounts {
        let jobs = self.groups[group.index()].read();
        JobCounts {
            statics: jobs.statics.capacity(),
            skinned: jobs.skinned.capacity(),
        }
    }

    pub fn group_mut(&mut self, group: Group) -> &mut GroupJobs {
        self.groups[group.index()].get_mut()
    }

    /// Resets counts to zero; capacity is retained.
    pub fn clear(&mut self) {
        for jobs in &mut self.groups {
            let jobs = jobs.get_mut();
            jobs.statics.clear();
            jobs.skinned.clear();
        }
    }
}

// renderer/visibility.rs
use rayon::prelude::*;

use crate::renderer::camera::{Camera, Frustum};
use crate::renderer::job::{Aabb, JobKind, RenderJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Occluded,
    Unknown,
}

/// Visibility query consulted once per job. Called from worker threads.
pub trait OcclusionTester: Sync {
    fn test(&self, bounds: &Aabb) -> Visibility;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysVisible;

impl OcclusionTester for AlwaysVisible {
    fn test(&self, _bounds: &Aabb) -> Visibility {
        Visibility::Visible
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrustumTester {
    frustum: Frustum,
}

impl FrustumTester {
    pub fn new(camera: &Camera) -> Self {
        Self {
            frustum: camera.frustum(),
        }
    }
}

impl OcclusionTester for FrustumTester {
    fn test(&self, bounds: &Aabb) -> Visibility {
        if self.frustum.intersects_aabb(bounds) {
            Visibility::Visible
        } else {
            Visibility::Occluded
        }
    }
}

/// Marks every job whose bounds are not reported visible. Both `Occluded`
/// and `Unknown` cull. Returns the number of culled jobs.
pub fn cull_jobs<K: JobKind>(jobs: &mut [RenderJob<K>], tester: &dyn OcclusionTester) -> usize {
    jobs.par_iter_mut()
        .map(|job| {
            job.culled = tester.test(&job.bounds) != Visibility::Visible;
            usize::from(job.culled)
        })
        .sum()
}

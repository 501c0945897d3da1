mod support;

use std::sync::Arc;

use glam::{Mat4, Vec3};
use model_batch::renderer::{
    Aabb, AlwaysVisible, BlendMode, DispatchStats, FrameContext, FrustumTester, Group, MaskKey,
    Material, MeshKey, ModelRenderer, OcclusionTester, Pass, PassState, SkinTableId, SkinnedJob,
    TextureHandle, TextureSlot,
};
use model_batch::BatchSettings;

use support::{
    back_buffer, camera, glass, job, lights, Command, MockPool, RecordingSink, ScriptedCompiler,
};

type TestRenderer = ModelRenderer<ScriptedCompiler, MockPool>;

fn renderer(settings: BatchSettings) -> TestRenderer {
    ModelRenderer::new(settings, ScriptedCompiler::default(), MockPool::default())
}

fn render(
    renderer: &mut TestRenderer,
    group: Group,
    occlusion: &dyn OcclusionTester,
    width: u32,
) -> (RecordingSink, DispatchStats) {
    let camera = camera();
    let lights = lights();
    let frame = FrameContext {
        camera: &camera,
        lights: &lights,
        occlusion,
        back_buffer: back_buffer(width, 720),
    };
    let mut sink = RecordingSink::default();
    let stats = renderer.render(group, &frame, &mut sink);
    (sink, stats)
}

fn draw_xs(commands: &[Command]) -> Vec<f32> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::Draw { x, .. } => Some(*x),
            _ => None,
        })
        .collect()
}

fn skinned_job(material: &Option<Arc<Material>>, x: f32) -> SkinnedJob {
    SkinnedJob::new(
        MeshKey(50),
        material.clone(),
        Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
        Aabb::from_center(Vec3::new(x, 0.0, 0.0), Vec3::splat(0.5)),
        SkinTableId::from_raw(0),
    )
    .with_sort_depth(x)
}

#[test]
fn six_hundred_shared_jobs_split_at_the_instancing_limit() {
    let mut renderer = renderer(BatchSettings::default());
    for i in 0..600 {
        renderer.push_job(job(1, &None, i as f32 * 0.01, 0.0));
    }

    let (sink, stats) = render(&mut renderer, Group::Deferred, &AlwaysVisible, 1280);

    assert_eq!(sink.instanced_counts(), [512, 88]);
    assert_eq!(sink.bound_variants(), [MaskKey::USE_INSTANCING]);
    assert_eq!(stats.instanced_draws, 2);
    assert_eq!(stats.individual_draws, 0);
    assert_eq!(
        sink.commands[0],
        Command::Begin {
            target: None,
            lit: false,
            instance_capacity: 600,
        }
    );
    assert_eq!(sink.commands.last(), Some(&Command::End));
}

#[test]
fn instanced_draws_cover_every_instance_once() {
    let mut renderer = renderer(BatchSettings {
        max_instancing_count: 100,
        ..Default::default()
    });
    for i in 0..250 {
        renderer.push_job(job(3, &None, i as f32, 0.0));
    }

    let (sink, _) = render(&mut renderer, Group::Deferred, &AlwaysVisible, 1280);
    let uploads: Vec<usize> = sink
        .commands
        .iter()
        .filter_map(|c| match c {
            Command::Upload(n) => Some(*n),
            _ => None,
        })
        .collect();

    assert_eq!(sink.instanced_counts(), [100, 100, 50]);
    assert_eq!(uploads, [100, 100, 50]);
}

#[test]
fn unshared_jobs_are_drawn_individually() {
    let mut renderer = renderer(BatchSettings::default());
    for mesh in 0..3 {
        renderer.push_job(job(mesh, &None, mesh as f32, 0.0));
    }

    let (sink, stats) = render(&mut renderer, Group::Deferred, &AlwaysVisible, 1280);

    assert_eq!(stats.individual_draws, 3);
    assert_eq!(stats.instanced_draws, 0);
    assert_eq!(sink.bound_variants(), [MaskKey::empty()]);
}

#[test]
fn blended_jobs_draw_near_to_far_in_both_sweeps() {
    let mut renderer = renderer(BatchSettings::default());
    let glass = Some(glass("glass"));
    for depth in [5.0, 1.0, 3.0] {
        renderer.push_job(job(9, &glass, depth, depth));
    }

    let (sink, stats) = render(&mut renderer, Group::AlphaBlend, &AlwaysVisible, 1280);

    assert_eq!(draw_xs(&sink.commands), [1.0, 3.0, 5.0, 1.0, 3.0, 5.0]);
    assert_eq!(stats.individual_draws, 6);
    assert_eq!(stats.instanced_draws, 0);

    let states: Vec<PassState> = sink
        .commands
        .iter()
        .filter_map(|c| match c {
            Command::BindMaterial { state, .. } => Some(*state),
            _ => None,
        })
        .collect();
    let passes: Vec<Pass> = states.iter().map(|state| state.pass).collect();
    assert_eq!(passes, [Pass::AlphaBlendPre, Pass::AlphaBlendPost]);

    let (pre, post) = (states[0], states[1]);
    assert!(pre.depth_test && !pre.depth_write && !pre.color_write);
    assert!(post.depth_test && !post.depth_write && post.color_write);
    assert_ne!(post.blend, BlendMode::Off);

    let post_start = sink
        .commands
        .iter()
        .position(|c| {
            matches!(c, Command::BindMaterial { state, .. } if state.pass == Pass::AlphaBlendPost)
        })
        .unwrap();
    assert_eq!(draw_xs(&sink.commands[..post_start]), [1.0, 3.0, 5.0]);

    assert_eq!(
        sink.commands[0],
        Command::Begin {
            target: Some(1),
            lit: true,
            instance_capacity: 6,
        }
    );
}

#[test]
fn blended_order_is_global_across_masks_and_streams() {
    let mut renderer = renderer(BatchSettings::default());
    let glass = Some(glass("glass"));
    renderer.push_job(job(9, &glass, 3.0, 3.0));
    renderer.push_job(skinned_job(&glass, 2.0));
    renderer.push_job(job(9, &glass, 1.0, 1.0));

    let (sink, _) = render(&mut renderer, Group::AlphaBlend, &AlwaysVisible, 1280);

    let blended = MaskKey::USE_ALPHA_BLENDING;
    let skinned = MaskKey::USE_ALPHA_BLENDING | MaskKey::USE_SKINNING;
    assert_eq!(draw_xs(&sink.commands), [1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    assert_eq!(
        sink.bound_variants(),
        [blended, skinned, blended, blended, skinned, blended]
    );
}

#[test]
fn blended_jobs_are_never_instanced() {
    let mut renderer = renderer(BatchSettings::default());
    let glass = Some(glass("glass"));
    for i in 0..20 {
        renderer.push_job(job(9, &glass, i as f32, i as f32));
    }

    let (sink, stats) = render(&mut renderer, Group::AlphaBlend, &AlwaysVisible, 1280);

    assert!(sink.instanced_counts().is_empty());
    assert_eq!(stats.individual_draws, 40);
    assert!(sink
        .bound_variants()
        .iter()
        .all(|mask| !mask.is_instanced()));
}

#[test]
fn pending_textures_share_one_untextured_variant() {
    let mut renderer = renderer(BatchSettings::default());
    let diffuse = TextureHandle::pending(4);
    let brick = Some(Arc::new(
        Material::new("brick").with_texture(TextureSlot::Diffuse, diffuse.clone()),
    ));
    for i in 0..1000 {
        renderer.push_job(job(2, &brick, i as f32, 0.0));
    }

    let (sink, _) = render(&mut renderer, Group::Deferred, &AlwaysVisible, 1280);
    assert_eq!(renderer.variant_count(), 1);
    assert_eq!(sink.bound_variants()[0].texture_bits(), MaskKey::empty());
    renderer.cleanup();

    diffuse.mark_ready();
    for i in 0..1000 {
        renderer.push_job(job(2, &brick, i as f32, 0.0));
    }
    let (sink, _) = render(&mut renderer, Group::Deferred, &AlwaysVisible, 1280);
    assert_eq!(renderer.variant_count(), 2);
    assert!(sink.bound_variants()[0].contains(MaskKey::DIFFUSE_MAP));
}

#[test]
fn empty_group_issues_nothing() {
    let mut renderer = renderer(BatchSettings::default());
    renderer.push_job(job(1, &None, 0.0, 0.0));

    let (sink, stats) = render(&mut renderer, Group::AlphaBlend, &AlwaysVisible, 1280);

    assert!(sink.commands.is_empty());
    assert_eq!(stats.draw_calls(), 0);
    assert!(renderer.pool().acquired.is_empty());
}

#[test]
fn cleanup_resets_counts_but_keeps_capacity() {
    let mut renderer = renderer(BatchSettings {
        initial_job_capacity: 4,
        ..Default::default()
    });
    for i in 0..1000 {
        renderer.push_job(job(1, &None, i as f32, 0.0));
    }
    let before = renderer.job_capacities(Group::Deferred);

    renderer.cleanup();

    assert_eq!(renderer.job_counts(Group::Deferred).statics, 0);
    assert!(renderer.job_capacities(Group::Deferred).statics >= before.statics);

    for i in 0..1000 {
        renderer.push_job(job(1, &None, i as f32, 0.0));
    }
    assert_eq!(renderer.job_capacities(Group::Deferred), before);
}

#[test]
fn failed_variant_skips_its_batches_and_retries_next_frame() {
    let mut renderer = renderer(BatchSettings::default());
    renderer
        .compiler_mut()
        .failing
        .insert(MaskKey::USE_INSTANCING);

    let push = |renderer: &TestRenderer| {
        for i in 0..10 {
            renderer.push_job(job(1, &None, i as f32, 0.0));
        }
        renderer.push_job(job(2, &None, 0.0, 0.0));
    };

    push(&renderer);
    let (sink, stats) = render(&mut renderer, Group::Deferred, &AlwaysVisible, 1280);
    assert_eq!(stats.compile_failures, 1);
    assert_eq!(stats.skipped_batches, 1);
    assert_eq!(stats.individual_draws, 1);
    assert_eq!(sink.bound_variants(), [MaskKey::empty()]);
    assert_eq!(renderer.variant_count(), 1);
    renderer.cleanup();

    renderer.compiler_mut().failing.clear();
    push(&renderer);
    let (_, stats) = render(&mut renderer, Group::Deferred, &AlwaysVisible, 1280);
    assert_eq!(stats.compile_failures, 0);
    assert_eq!(stats.instanced_draws, 1);
    assert_eq!(renderer.variant_count(), 2);
}

#[test]
fn failed_blended_variant_is_attempted_once_per_frame() {
    let mut renderer = renderer(BatchSettings::default());
    renderer
        .compiler_mut()
        .failing
        .insert(MaskKey::USE_ALPHA_BLENDING);
    let glass = Some(glass("glass"));
    for depth in [1.0, 2.0, 3.0] {
        renderer.push_job(job(9, &glass, depth, depth));
    }

    let (sink, stats) = render(&mut renderer, Group::AlphaBlend, &AlwaysVisible, 1280);

    assert_eq!(renderer.compiler().attempts, 1);
    assert_eq!(stats.compile_failures, 1);
    assert!(sink.draws().is_empty());
}

#[test]
fn blend_target_is_reused_until_the_back_buffer_changes() {
    let mut renderer = renderer(BatchSettings::default());
    let glass = Some(glass("glass"));

    for width in [1280, 1280, 1920] {
        renderer.push_job(job(9, &glass, 1.0, 1.0));
        render(&mut renderer, Group::AlphaBlend, &AlwaysVisible, width);
        renderer.cleanup();
    }

    assert_eq!(renderer.pool().acquired.len(), 2);
    assert_eq!(renderer.pool().acquired[1].width, 1920);
    assert_eq!(renderer.pool().released, [1]);

    renderer.release_targets();
    assert_eq!(renderer.pool().released, [1, 2]);
}

#[test]
fn only_the_deferred_group_is_culled() {
    let mut renderer = renderer(BatchSettings::default());
    let glass = Some(glass("glass"));
    renderer.push_job(job(1, &None, 0.0, 0.0));
    renderer.push_job(job(2, &None, 1000.0, 0.0));
    renderer.push_job(job(9, &glass, 1000.0, 1.0));

    let tester = FrustumTester::new(&camera());
    let (_, opaque) = render(&mut renderer, Group::Deferred, &tester, 1280);
    let (_, blended) = render(&mut renderer, Group::AlphaBlend, &tester, 1280);

    assert_eq!(opaque.culled_jobs, 1);
    assert_eq!(opaque.individual_draws, 1);
    assert_eq!(blended.culled_jobs, 0);
    assert_eq!(blended.individual_draws, 2);
}

#[test]
fn culling_can_be_disabled() {
    let mut renderer = renderer(BatchSettings {
        occlusion_culling: false,
        ..Default::default()
    });
    renderer.push_job(job(2, &None, 1000.0, 0.0));

    let tester = FrustumTester::new(&camera());
    let (_, stats) = render(&mut renderer, Group::Deferred, &tester, 1280);

    assert_eq!(stats.culled_jobs, 0);
    assert_eq!(stats.individual_draws, 1);
}

#[test]
fn deterministic_order_sorts_variants_by_mask() {
    let run = || {
        let mut renderer = renderer(BatchSettings {
            deterministic_order: true,
            ..Default::default()
        });
        renderer.push_job(skinned_job(&None, 0.0));
        renderer.push_job(job(1, &None, 0.0, 0.0));
        renderer.push_job(job(1, &None, 1.0, 0.0));
        renderer.push_job(job(2, &None, 0.0, 0.0));
        render(&mut renderer, Group::Deferred, &AlwaysVisible, 1280).0
    };

    let first = run();
    assert_eq!(
        first.bound_variants(),
        [
            MaskKey::empty(),
            MaskKey::USE_INSTANCING,
            MaskKey::USE_SKINNING
        ]
    );
    assert_eq!(first.commands, run().commands);
}

#[test]
fn producers_on_many_threads_lose_nothing() {
    let mut renderer = renderer(BatchSettings {
        initial_job_capacity: 1,
        ..Default::default()
    });
    let glass = Some(glass("glass"));

    std::thread::scope(|scope| {
        for t in 0..4 {
            let renderer = &renderer;
            let glass = glass.clone();
            scope.spawn(move || {
                let opaque = None;
                for i in 0..500 {
                    let material = if i % 5 == 0 { &glass } else { &opaque };
                    renderer.push_job(job(t, material, i as f32, i as f32));
                }
            });
        }
    });

    assert_eq!(renderer.job_counts(Group::Deferred).statics, 1600);
    assert_eq!(renderer.job_counts(Group::AlphaBlend).statics, 400);

    let (_, stats) = render(&mut renderer, Group::Deferred, &AlwaysVisible, 1280);
    assert_eq!(stats.instanced_draws, 4);
}

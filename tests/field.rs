use lucent::core::glam::{DVec3, IVec3, Vec3A};
use lucent::core::ilattice::prelude::Extent;
use lucent::probes::{
    ClipmapConfig, LightRgbs, ProbeLifecycleState, SparseBlockWorld, TraceServiceConfig, UniformSky, UpdateBudgets,
    VoxelTraceScene,
};
use lucent::{Config, FieldConfig, ProbeField};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const FLOOR_BLOCK: u16 = 1;

/// A floor of solid blocks at y = -1, with every chunk around the origin loaded.
fn floor_world() -> Arc<SparseBlockWorld> {
    let world = SparseBlockWorld::new(LightRgbs::new(0.0, 0.0, 0.0, 1.0));
    for z in -2..2 {
        for y in -1..1 {
            for x in -2..2 {
                world.insert_empty_chunk([x, y, z]);
            }
        }
    }
    world.fill_extent(
        Extent::from_min_and_shape(IVec3::new(-32, -1, -32), IVec3::new(64, 1, 64)),
        FLOOR_BLOCK,
    );
    Arc::new(world)
}

fn small_config() -> Config {
    Config {
        clipmap: ClipmapConfig {
            level_count: 2,
            resolution: 4,
            base_spacing: 1.0,
            stale_after_frames: 100_000,
            claim_timeout_frames: 0,
        },
        budgets: UpdateBudgets {
            per_level: vec![64, 64],
            trace_max_probes_per_frame: 128,
            upload_budget_bytes_per_frame: usize::MAX,
            atlas_texels_per_update: 0,
        },
        service: TraceServiceConfig {
            queue_capacity: 256,
            worker_count: 2,
        },
        field: FieldConfig {
            max_trace_distance_probes: 8.0,
            adaptive_trace_budget: false,
            target_trace_time_us: 4000,
        },
        ..Default::default()
    }
}

fn new_field(config: Config, world: &Arc<SparseBlockWorld>) -> ProbeField {
    let scene = Arc::new(VoxelTraceScene::new(Arc::clone(world)));
    ProbeField::new(config, scene, Arc::new(UniformSky([1.0; 3]))).unwrap()
}

fn camera() -> DVec3 {
    DVec3::new(0.5, 2.5, 0.5)
}

fn count_state(field: &ProbeField, level: u32, state: ProbeLifecycleState) -> usize {
    field
        .scheduler()
        .lifecycle_snapshot(level)
        .into_iter()
        .filter(|s| *s == state)
        .count()
}

fn all_valid(field: &ProbeField) -> bool {
    (0..field.scheduler().level_count()).all(|level| {
        count_state(field, level, ProbeLifecycleState::Valid) == field.scheduler().level(level).volume() as usize
    })
}

/// Runs frames at `camera` until `done` holds.
fn run_until(field: &mut ProbeField, camera: DVec3, mut done: impl FnMut(&ProbeField) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        field.update(camera);
        if done(field) {
            return;
        }
        assert!(Instant::now() < deadline, "field did not converge");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn every_probe_becomes_valid() {
    let world = floor_world();
    let mut field = new_field(small_config(), &world);
    run_until(&mut field, camera(), all_valid);

    // A probe half a block above the floor sees the floor below and open sky above.
    let slot = field.scheduler().level(0).local_to_linear(IVec3::new(1, 0, 1));
    let record = field.store().record(0, slot);
    assert!(
        record.ao_confidence > 0.2 && record.ao_confidence < 1.0,
        "{}",
        record.ao_confidence
    );
    assert!(record.mean_log_hit_distance > 0.0);

    let irradiance = field
        .sample_irradiance(DVec3::new(0.5, 1.5, 0.5), Vec3A::Y, camera())
        .unwrap();
    assert_eq!(irradiance.level, 0);
    assert!(irradiance.sky > 0.0);

    let stats = field.service_stats();
    assert_eq!(stats.rejected, 0);
    assert!(stats.completed >= 128);
}

#[test]
fn backpressure_does_not_lose_probes() {
    let world = floor_world();
    let mut config = small_config();
    config.service = TraceServiceConfig {
        queue_capacity: 1,
        worker_count: 1,
    };
    let mut field = new_field(config, &world);

    let first = field.update(camera());
    assert_eq!(first.selected, 128);
    assert_eq!(first.enqueued + first.rejected, first.selected);
    assert!(first.rejected > 0);
    // Rejected probes were released, so nothing is left waiting without a work item.
    let waiting: usize = (0..2)
        .map(|level| {
            count_state(&field, level, ProbeLifecycleState::Queued)
                + count_state(&field, level, ProbeLifecycleState::InFlight)
        })
        .sum();
    assert!(waiting <= first.enqueued);

    run_until(&mut field, camera(), all_valid);
}

#[test]
fn moving_camera_keeps_overlapping_probes() {
    let world = floor_world();
    let mut field = new_field(small_config(), &world);
    run_until(&mut field, camera(), all_valid);

    let moved = camera() + DVec3::X;
    let stats = field.update(moved);
    assert_eq!(stats.anchor_shifts, 1);
    // One slab of 4x4 probes entered level 0; the other 48 kept their data.
    assert!(count_state(&field, 0, ProbeLifecycleState::Valid) >= 48);
    assert_eq!(count_state(&field, 1, ProbeLifecycleState::Valid), 64);

    run_until(&mut field, moved, all_valid);
}

#[test]
fn edits_invalidate_nearby_probes() {
    let world = floor_world();
    let mut field = new_field(small_config(), &world);
    run_until(&mut field, camera(), all_valid);
    for level in 0..2 {
        field.store_mut().take_dirty(level);
    }

    world.set_block(IVec3::new(0, 0, 0), FLOOR_BLOCK);
    let invalidated = field.invalidate_world_box(DVec3::splat(-1.0), DVec3::splat(2.0));
    assert!(invalidated > 0);
    assert!(count_state(&field, 0, ProbeLifecycleState::Stale) > 0);

    run_until(&mut field, camera(), all_valid);
    assert!(!field.store_mut().take_dirty(0).is_empty());
}

#[test]
fn adaptive_budget_limits_traces() {
    let world = floor_world();
    let mut config = small_config();
    config.service.worker_count = 1;
    config.field = FieldConfig {
        adaptive_trace_budget: true,
        target_trace_time_us: 1,
        ..config.field
    };
    let mut field = new_field(config, &world);

    let stats = field.update(camera());
    assert_eq!(stats.trace_limit, 1);
    assert_eq!(stats.selected, 1);
}

#[test]
fn shut_down_field_rejects_all_work() {
    let world = floor_world();
    let mut field = new_field(small_config(), &world);
    field.shutdown();

    for _ in 0..3 {
        let stats = field.update(camera());
        assert_eq!(stats.enqueued, 0);
        assert_eq!(stats.rejected, stats.selected);
        assert_eq!(stats.completed, 0);
    }
    assert_eq!(count_state(&field, 0, ProbeLifecycleState::Queued), 0);
}

//! Flies a camera over generated terrain and logs how the probe field keeps up.
//!
//! Usage: `probe-bench [CONFIG.ron] [FRAMES]`. Set `RUST_LOG=info` (or `debug`) to see the output.

use lucent::core::glam::{DVec3, IVec3};
use lucent::core::ilattice::prelude::Extent;
use lucent::probes::{HemisphereSky, LightRgbs, ProbeLifecycleState, SparseBlockWorld, VoxelTraceScene};
use lucent::{Config, FrameStats, ProbeField};

use std::sync::Arc;
use std::time::{Duration, Instant};

const TERRAIN_HALF_EXTENT: i32 = 256;
const STONE: u16 = 1;
const FRAME_TIME: Duration = Duration::from_millis(16);

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => match Config::read_file(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to read {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    let frames: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(600);

    let world = Arc::new(generate_terrain());
    log::info!("Generated {} chunks of terrain", world.num_chunks());

    let scene = Arc::new(VoxelTraceScene::new(Arc::clone(&world)));
    let sky_color = config.integrator.sky_color;
    let mut field = match ProbeField::new(config, scene, Arc::new(HemisphereSky(sky_color))) {
        Ok(field) => field,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut totals = FrameStats::default();
    let mut main_thread_time = Duration::ZERO;
    for frame in 0..frames {
        let start = Instant::now();
        let camera = camera_path(frame);
        let stats = field.update(camera);
        let elapsed = start.elapsed();
        main_thread_time += elapsed;

        totals.anchor_shifts += stats.anchor_shifts;
        totals.selected += stats.selected;
        totals.enqueued += stats.enqueued;
        totals.rejected += stats.rejected;
        totals.completed += stats.completed;
        totals.discarded += stats.discarded;
        totals.failed += stats.failed;

        log::debug!("{:?} in {:?}", stats, elapsed);
        if frame % 60 == 59 {
            log::info!(
                "Frame {}: {} of level 0 valid, trace limit {}",
                frame + 1,
                valid_fraction(&field, 0),
                stats.trace_limit
            );
        }

        for level in 0..field.scheduler().level_count() {
            field.store_mut().take_dirty(level);
        }
        if let Some(rest) = FRAME_TIME.checked_sub(elapsed) {
            std::thread::sleep(rest);
        }
    }

    field.shutdown();
    log::info!("Totals over {} frames: {:?}", frames, totals);
    log::info!(
        "Average main thread time per frame: {:?}",
        main_thread_time / frames.max(1) as u32
    );
    log::info!("Service: {:?}", field.service_stats());
}

/// Rolling hills of stone, lit by the sky only.
fn generate_terrain() -> SparseBlockWorld {
    let world = SparseBlockWorld::new(LightRgbs::sky(1.0));
    let h = TERRAIN_HALF_EXTENT;
    for z in -h..h {
        for x in -h..h {
            let height = terrain_height(x, z);
            world.fill_extent(
                Extent::from_min_and_shape(IVec3::new(x, -16, z), IVec3::new(1, height + 16, 1)),
                STONE,
            );
        }
    }
    // Load the air above the hills too.
    for cz in (-h >> 4)..(h >> 4) {
        for cy in 0..4 {
            for cx in (-h >> 4)..(h >> 4) {
                world.insert_empty_chunk([cx, cy, cz]);
            }
        }
    }
    world
}

fn terrain_height(x: i32, z: i32) -> i32 {
    let (x, z) = (x as f64, z as f64);
    (6.0 + 4.0 * (x * 0.07).sin() + 3.0 * (z * 0.05).cos() + 2.0 * ((x + z) * 0.13).sin()) as i32
}

fn camera_path(frame: u64) -> DVec3 {
    let t = frame as f64 / 60.0;
    DVec3::new(t * 8.0 - 100.0, 20.0 + 4.0 * (t * 0.5).sin(), 10.0 * (t * 0.3).cos())
}

fn valid_fraction(field: &ProbeField, level: u32) -> f64 {
    let snapshot = field.scheduler().lifecycle_snapshot(level);
    let valid = snapshot
        .iter()
        .filter(|s| **s == ProbeLifecycleState::Valid)
        .count();
    valid as f64 / snapshot.len().max(1) as f64
}

use crate::clipmap::WorldProbeScheduler;
use crate::topology::*;
use crate::units::ProbeUnits;
use crate::upload::{CpuProbeStore, ShProbe};

use lucent_core::glam::{DVec3, IVec3, Vec3A};

/// Irradiance reconstructed from the probe field at a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeIrradiance {
    pub rgb: [f32; 3],
    pub sky: f32,
    pub ao_confidence: f32,
    /// The finest level that contributed.
    pub level: u32,
}

/// CPU lookups into the probe field, for gameplay queries and for checking what the GPU should see.
///
/// A lookup picks the finest level that covers the point, trilinearly interpolates the surrounding probes that hold data,
/// and cross-fades into the next coarser level near the edge of the finer level's window.
pub struct ProbeSampler<'a> {
    scheduler: &'a WorldProbeScheduler,
    store: &'a CpuProbeStore,
    /// Distance from a level's boundary, in probes, where the fade to the coarser level ends.
    blend_start: f64,
    blend_width: f64,
}

struct LevelSample {
    sh: ShProbe,
    ao_confidence: f32,
}

impl<'a> ProbeSampler<'a> {
    pub fn new(scheduler: &'a WorldProbeScheduler, store: &'a CpuProbeStore) -> Self {
        Self {
            scheduler,
            store,
            blend_start: 1.0,
            blend_width: 2.0,
        }
    }

    /// A non-positive `width` switches levels with a hard cut at `start` probes from the boundary.
    pub fn with_blend(mut self, start: f64, width: f64) -> Self {
        self.blend_start = start;
        self.blend_width = width;
        self
    }

    /// `None` when no level has data around `position`.
    pub fn sample_irradiance(&self, position: DVec3, normal: Vec3A, camera: DVec3) -> Option<ProbeIrradiance> {
        let base_spacing = self.scheduler.level_params(0)?.spacing;
        let level_count = self.scheduler.level_count();
        let first = select_level_by_distance(
            position.distance(camera),
            base_spacing,
            self.scheduler.resolution(),
            level_count,
        );

        for level in first..level_count {
            let fine = match self.sample_level(level, position) {
                Some(s) => s,
                None => continue,
            };

            let params = self.scheduler.level_params(level)?;
            let local = world_to_local(position, params.origin, params.spacing);
            let edge = distance_to_boundary_probe_units(local, params.resolution);
            let w_fine = cross_level_blend_weight(edge, self.blend_start, self.blend_width) as f32;

            let blended = if w_fine < 1.0 && level + 1 < level_count {
                match self.sample_level(level + 1, position) {
                    Some(coarse) => LevelSample {
                        sh: coarse.sh.lerp(&fine.sh, w_fine),
                        ao_confidence: coarse.ao_confidence
                            + (fine.ao_confidence - coarse.ao_confidence) * w_fine,
                    },
                    None => fine,
                }
            } else {
                fine
            };

            let (rgb, sky) = blended.sh.irradiance(normal);
            return Some(ProbeIrradiance {
                rgb,
                sky,
                ao_confidence: blended.ao_confidence,
                level,
            });
        }

        None
    }

    /// Trilinear interpolation over the eight probes around `position`, renormalized over the ones with data.
    fn sample_level(&self, level: u32, position: DVec3) -> Option<LevelSample> {
        let params = self.scheduler.level_params(level)?;
        let res = params.resolution as i32;
        let clipmap_level = self.scheduler.level(level);

        // Probe centers sit at half-integer local coordinates.
        let ProbeUnits(local) = world_to_local(position, params.origin, params.spacing);
        let p = local - DVec3::splat(0.5);
        let min_corner = floor_to_ivec3(p);
        let f = p - ivec3_to_dvec3(min_corner);

        let mut sh = ShProbe::default();
        let mut ao_confidence = 0.0;
        let mut total_weight = 0.0;
        for z in [0, 1] {
            for y in [0, 1] {
                for x in [0, 1] {
                    let index = min_corner + IVec3::new(x, y, z);
                    if !index_in_bounds(index, res) {
                        continue;
                    }
                    let linear = clipmap_level.local_to_linear(index);
                    if !self.scheduler.slot_has_data(level, linear) {
                        continue;
                    }
                    let axis_weight = |t: f64, c: i32| if c == 0 { 1.0 - t } else { t };
                    let w = (axis_weight(f.x, x) * axis_weight(f.y, y) * axis_weight(f.z, z)) as f32;
                    if w <= 0.0 {
                        continue;
                    }
                    let record = self.store.record(level, linear);
                    sh = sh.add(&record.sh.scaled(w));
                    ao_confidence += record.ao_confidence * w;
                    total_weight += w;
                }
            }
        }

        if total_weight <= 1e-6 {
            return None;
        }
        Some(LevelSample {
            sh: sh.scaled(1.0 / total_weight),
            ao_confidence: ao_confidence / total_weight,
        })
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{ClipmapConfig, UpdateBudgets};
    use crate::upload::{ProbeRecord, ProbeUploadSink, UploadCostModel};

    use lucent_core::approx::assert_relative_eq;

    fn camera() -> DVec3 {
        DVec3::splat(0.5)
    }

    fn setup() -> (WorldProbeScheduler, CpuProbeStore) {
        let config = ClipmapConfig {
            level_count: 2,
            resolution: 4,
            base_spacing: 1.0,
            stale_after_frames: 1000,
            claim_timeout_frames: 0,
        };
        let mut scheduler = WorldProbeScheduler::new(config, UploadCostModel::default()).unwrap();
        scheduler.update_origins(camera(), 1.0, |_| ());
        let store = CpuProbeStore::new(2, 64, 0);
        (scheduler, store)
    }

    /// Traces every probe on `level` "successfully", with an L0-only red channel of `red(local_index)`.
    fn fill(
        scheduler: &mut WorldProbeScheduler,
        store: &mut CpuProbeStore,
        level: u32,
        red: impl Fn(IVec3) -> f32,
    ) {
        let mut per_level = vec![0; 2];
        per_level[level as usize] = 64;
        let budgets = UpdateBudgets {
            per_level,
            trace_max_probes_per_frame: 64,
            upload_budget_bytes_per_frame: usize::MAX,
            atlas_texels_per_update: 0,
        };
        for r in scheduler.build_update_list(1, camera(), 1.0, &budgets) {
            assert!(scheduler.try_claim(&r, 1));
            assert!(scheduler.complete(&r, 1, true));
            let sh = ShProbe {
                r: [red(r.local_index), 0.0, 0.0, 0.0],
                ..Default::default()
            };
            store.write_probe(level, r.storage_linear_index, &ProbeRecord::new(sh, [0.0, 1.0, 0.0], 0.5, 0.0, 1.0));
        }
    }

    fn red_irradiance(l0: f32) -> f32 {
        let sh = ShProbe {
            r: [l0, 0.0, 0.0, 0.0],
            ..Default::default()
        };
        sh.irradiance(Vec3A::Y).0[0]
    }

    #[test]
    fn empty_field_has_no_samples() {
        let (scheduler, store) = setup();
        let sampler = ProbeSampler::new(&scheduler, &store);
        assert_eq!(sampler.sample_irradiance(camera(), Vec3A::Y, camera()), None);
    }

    #[test]
    fn uniform_field_samples_uniformly() {
        let (mut scheduler, mut store) = setup();
        fill(&mut scheduler, &mut store, 0, |_| 2.0);
        fill(&mut scheduler, &mut store, 1, |_| 2.0);
        let sampler = ProbeSampler::new(&scheduler, &store);
        for position in [camera(), DVec3::new(-1.2, 0.3, 1.9), DVec3::new(3.0, -3.0, 0.0)] {
            let s = sampler.sample_irradiance(position, Vec3A::Y, camera()).unwrap();
            assert_relative_eq!(s.rgb[0], red_irradiance(2.0), epsilon = 1e-5);
            assert_relative_eq!(s.ao_confidence, 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn interpolates_between_probes() {
        let (mut scheduler, mut store) = setup();
        fill(&mut scheduler, &mut store, 0, |p| p.x as f32);
        let sampler = ProbeSampler::new(&scheduler, &store).with_blend(0.0, 0.0);

        // Local x = 2.25 is three quarters of the way from probe 1 to probe 2.
        let s = sampler
            .sample_irradiance(DVec3::splat(0.25), Vec3A::Y, camera())
            .unwrap();
        assert_eq!(s.level, 0);
        assert_relative_eq!(s.rgb[0], red_irradiance(1.75), epsilon = 1e-5);
    }

    #[test]
    fn falls_back_to_coarser_level() {
        let (mut scheduler, mut store) = setup();
        fill(&mut scheduler, &mut store, 1, |_| 3.0);
        let sampler = ProbeSampler::new(&scheduler, &store);
        let s = sampler.sample_irradiance(camera(), Vec3A::Y, camera()).unwrap();
        assert_eq!(s.level, 1);
        assert_relative_eq!(s.rgb[0], red_irradiance(3.0), epsilon = 1e-5);
    }

    #[test]
    fn blends_into_coarser_level_near_the_edge() {
        let (mut scheduler, mut store) = setup();
        fill(&mut scheduler, &mut store, 0, |_| 1.0);
        fill(&mut scheduler, &mut store, 1, |_| 3.0);
        let sampler = ProbeSampler::new(&scheduler, &store);

        // Two probes from the edge of level 0, halfway through the default fade.
        let s = sampler
            .sample_irradiance(DVec3::ZERO, Vec3A::Y, camera())
            .unwrap();
        assert_eq!(s.level, 0);
        assert_relative_eq!(s.rgb[0], red_irradiance(2.0), epsilon = 1e-5);
    }

    #[test]
    fn retraced_probes_are_still_sampled() {
        let (mut scheduler, mut store) = setup();
        fill(&mut scheduler, &mut store, 0, |_| 2.0);
        let sampler = ProbeSampler::new(&scheduler, &store).with_blend(0.0, 0.0);
        let before = sampler.sample_irradiance(camera(), Vec3A::Y, camera()).unwrap();

        assert_eq!(
            scheduler.invalidate_world_box(DVec3::splat(-10.0), DVec3::splat(10.0)),
            64
        );
        let budgets = UpdateBudgets {
            per_level: vec![64, 0],
            trace_max_probes_per_frame: 64,
            upload_budget_bytes_per_frame: usize::MAX,
            atlas_texels_per_update: 0,
        };
        let requests = scheduler.build_update_list(2, camera(), 1.0, &budgets);
        assert_eq!(requests.len(), 64);
        for r in requests.iter().step_by(2) {
            assert!(scheduler.try_claim(r, 2));
        }

        let sampler = ProbeSampler::new(&scheduler, &store).with_blend(0.0, 0.0);
        let during = sampler.sample_irradiance(camera(), Vec3A::Y, camera()).unwrap();
        assert_eq!(during.level, 0);
        assert_eq!(during, before);
        assert_relative_eq!(during.rgb[0], red_irradiance(2.0), epsilon = 1e-5);
    }
}

use crate::clipmap::UpdateRequest;
use crate::config::{IntegratorConfig, ProbeOutputMode};
use crate::directions::TraceDirections;
use crate::error::ClipmapError;
use crate::scene::{TraceOutcome, TraceScene};
use crate::topology::dvec3_to_vec3a;
use crate::upload::{AtlasSample, ProbeRecord, ShProbe};

use lucent_core::glam::{DVec3, Vec3A};
use lucent_core::{CancelToken, Cancelled};
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Radiance arriving from the sky along a direction that escaped the scene.
pub trait SkyRadiance: Send + Sync {
    fn radiance(&self, dir: Vec3A) -> [f32; 3];
}

impl<F> SkyRadiance for F
where
    F: Fn(Vec3A) -> [f32; 3] + Send + Sync,
{
    fn radiance(&self, dir: Vec3A) -> [f32; 3] {
        self(dir)
    }
}

/// The same radiance in every direction.
#[derive(Clone, Copy, Debug)]
pub struct UniformSky(pub [f32; 3]);

impl SkyRadiance for UniformSky {
    fn radiance(&self, _dir: Vec3A) -> [f32; 3] {
        self.0
    }
}

/// Light from above only, falling off with the cosine to the zenith.
#[derive(Clone, Copy, Debug)]
pub struct HemisphereSky(pub [f32; 3]);

impl SkyRadiance for HemisphereSky {
    fn radiance(&self, dir: Vec3A) -> [f32; 3] {
        let up = dir.y.max(0.0);
        self.0.map(|c| c * up)
    }
}

/// One probe to trace.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceWorkItem {
    pub frame_index: u64,
    pub request: UpdateRequest,
    pub probe_pos_world: DVec3,
    pub max_trace_distance: f32,
    /// Tile size of the atlas the result is written to; zero when only SH is produced. Must match
    /// [`TraceIntegrator::atlas_tile_size`], otherwise the trace fails.
    pub octahedral_tile_size: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProbeRadiance {
    Sh(ShProbe),
    /// One sample per direction, in direction table order.
    Atlas(Vec<AtlasSample>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraceResult {
    pub frame_index: u64,
    pub request: UpdateRequest,
    /// `false` when the probe could not be traced, e.g. because its surroundings are not loaded yet.
    pub success: bool,
    pub radiance: ProbeRadiance,
    /// Fraction of directions that escaped within the trace distance.
    pub short_range_ao_confidence: f32,
    /// Unit mean of the escaping directions; +Y when nothing escaped.
    pub short_range_ao_dir_world: Vec3A,
    /// Mean of `log(hit_distance + 1)` over hits; zero without hits.
    pub mean_log_hit_distance: f32,
    /// Visible fraction of the upper hemisphere, cosine weighted.
    pub sky_intensity: f32,
    pub trace_time: Duration,
}

impl TraceResult {
    /// The record uploaded for this probe. Atlas results carry no SH.
    pub fn record(&self) -> ProbeRecord {
        let sh = match &self.radiance {
            ProbeRadiance::Sh(sh) => *sh,
            ProbeRadiance::Atlas(_) => ShProbe::default(),
        };
        ProbeRecord::new(
            sh,
            self.short_range_ao_dir_world.to_array(),
            self.short_range_ao_confidence,
            self.mean_log_hit_distance,
            self.sky_intensity,
        )
    }
}

/// Traces a probe's fixed direction table against a [`TraceScene`] and reduces the hits and misses to radiance and
/// occlusion terms.
///
/// Directions are accumulated in table order, so a given scene and work item always produce the same result.
#[derive(Clone)]
pub struct TraceIntegrator {
    config: IntegratorConfig,
    directions: TraceDirections,
    sky: Arc<dyn SkyRadiance>,
}

impl TraceIntegrator {
    pub fn new(config: IntegratorConfig, directions: TraceDirections, sky: Arc<dyn SkyRadiance>) -> Self {
        Self {
            config,
            directions,
            sky,
        }
    }

    /// Uses the shared octahedral direction table for `config.octahedral_tile_size`.
    pub fn from_config(config: IntegratorConfig, sky: Arc<dyn SkyRadiance>) -> Result<Self, ClipmapError> {
        if config.octahedral_tile_size == 0 {
            return Err(ClipmapError::ZeroTileSize);
        }
        let directions = TraceDirections::octahedral(config.octahedral_tile_size);
        Ok(Self::new(config, directions, sky))
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    pub fn directions(&self) -> &TraceDirections {
        &self.directions
    }

    /// Side length of the octahedral tile each atlas update fills. Zero in SH mode, or when the direction table has no
    /// octahedral layout.
    pub fn atlas_tile_size(&self) -> u32 {
        match self.config.mode {
            ProbeOutputMode::Sh => 0,
            ProbeOutputMode::Atlas => self.directions.tile_size().unwrap_or(0),
        }
    }

    /// Atlas texels written per probe update, zero in SH mode.
    pub fn texels_per_update(&self) -> usize {
        match self.config.mode {
            ProbeOutputMode::Sh => 0,
            ProbeOutputMode::Atlas => self.directions.len(),
        }
    }

    pub fn trace_probe(
        &self,
        scene: &(impl TraceScene + ?Sized),
        item: &TraceWorkItem,
        cancel: &CancelToken,
    ) -> Result<TraceResult, Cancelled> {
        let start = Instant::now();
        let origin = dvec3_to_vec3a(item.probe_pos_world);
        let max_distance = item.max_trace_distance;

        let mut result = TraceResult {
            frame_index: item.frame_index,
            request: item.request,
            success: true,
            radiance: match self.config.mode {
                ProbeOutputMode::Sh => ProbeRadiance::Sh(ShProbe::default()),
                ProbeOutputMode::Atlas => ProbeRadiance::Atlas(Vec::with_capacity(self.directions.len())),
            },
            short_range_ao_confidence: 1.0,
            short_range_ao_dir_world: Vec3A::Y,
            mean_log_hit_distance: 0.0,
            sky_intensity: 1.0,
            trace_time: Duration::ZERO,
        };

        if item.octahedral_tile_size != self.atlas_tile_size() {
            log::warn!(
                "Work item expects tile size {} but the integrator produces {}",
                item.octahedral_tile_size,
                self.atlas_tile_size()
            );
            result.success = false;
            result.trace_time = start.elapsed();
            return Ok(result);
        }

        if !scene.is_loaded(origin) {
            log::trace!("Probe at {:?} is not loaded", item.probe_pos_world);
            result.success = false;
            result.trace_time = start.elapsed();
            return Ok(result);
        }

        let directions = self.directions.directions();
        if directions.is_empty() {
            result.trace_time = start.elapsed();
            return Ok(result);
        }
        let weight = 4.0 * PI / directions.len() as f32;
        let miss_alpha = -(max_distance + 1.0).ln();

        let mut misses = 0u32;
        let mut hits = 0u32;
        let mut log_hit_distance_sum = 0.0;
        let mut miss_dir_sum = Vec3A::ZERO;
        let mut up_total = 0.0;
        let mut up_visible = 0.0;
        for &dir in directions {
            let (outcome, hit) = scene.trace(origin, dir, max_distance, cancel)?;
            let up = dir.y.max(0.0);
            up_total += up;

            let (rgb, sky_visibility, alpha) = match outcome {
                TraceOutcome::Miss => {
                    misses += 1;
                    miss_dir_sum += dir;
                    up_visible += up;
                    (self.sky.radiance(dir), 1.0, miss_alpha)
                }
                TraceOutcome::Hit => {
                    hits += 1;
                    let log_distance = (hit.hit_distance + 1.0).ln();
                    log_hit_distance_sum += log_distance;

                    let light = hit.sample_light_rgbs;
                    let s = self.config.block_light_scale;
                    let mut rgb = [light.r * s, light.g * s, light.b * s];

                    // Faces that point down can't see the sky.
                    let normal = hit.hit_face_normal;
                    if normal.y > 0.0 && light.sky > 0.0 {
                        let surface = origin + dir * hit.hit_distance + normal * self.config.normal_bias;
                        let (sky_outcome, _) =
                            scene.trace(surface, Vec3A::Y, self.config.sky_visibility_distance, cancel)?;
                        if sky_outcome == TraceOutcome::Miss {
                            let bounce = light.sky * normal.y * self.config.sky_bounce_scale;
                            for (c, sky) in rgb.iter_mut().zip(self.config.sky_color) {
                                *c += sky * bounce;
                            }
                        }
                    }

                    (rgb, 0.0, log_distance)
                }
            };

            match &mut result.radiance {
                ProbeRadiance::Sh(sh) => sh.add_sample(dir, rgb, sky_visibility, weight),
                ProbeRadiance::Atlas(samples) => samples.push(AtlasSample { radiance: rgb, alpha }),
            }
        }

        result.short_range_ao_confidence = misses as f32 / directions.len() as f32;
        if misses > 0 {
            let mean = miss_dir_sum.normalize_or_zero();
            if mean != Vec3A::ZERO {
                result.short_range_ao_dir_world = mean;
            }
        }
        if hits > 0 {
            result.mean_log_hit_distance = log_hit_distance_sum / hits as f32;
        }
        result.sky_intensity = if up_total > 0.0 {
            up_visible / up_total
        } else {
            result.short_range_ao_confidence
        };
        result.trace_time = start.elapsed();

        Ok(result)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

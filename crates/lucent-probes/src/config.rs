use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ClipmapConfig {
    /// Number of clipmap levels. Level `L` has probe spacing `base_spacing · 2^L`.
    pub level_count: u32,
    /// Probes per axis on every level.
    pub resolution: u32,
    /// Probe spacing of level 0, in world units. The host may pass a different spacing per frame; this is the default.
    pub base_spacing: f64,
    /// Frames after its last completion before a level 0 probe is considered stale. Doubles with every level.
    pub stale_after_frames: u64,
    /// Frames a probe may sit in `Queued` or `InFlight` before it is assumed lost and reset to `Empty`. Zero disables the
    /// timeout.
    pub claim_timeout_frames: u64,
}

impl Default for ClipmapConfig {
    fn default() -> Self {
        Self {
            level_count: 4,
            resolution: 16,
            base_spacing: 1.0,
            stale_after_frames: 240,
            claim_timeout_frames: 600,
        }
    }
}

/// Limits on the work issued by a single `build_update_list` call. The host may change these every frame.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UpdateBudgets {
    /// Maximum selections per level. Levels past the end of this list get no updates.
    pub per_level: Vec<usize>,
    pub trace_max_probes_per_frame: usize,
    pub upload_budget_bytes_per_frame: usize,
    /// Octahedral texels uploaded per probe update; zero when only SH data is uploaded.
    pub atlas_texels_per_update: usize,
}

impl Default for UpdateBudgets {
    fn default() -> Self {
        Self {
            per_level: vec![32, 16, 8, 8],
            trace_max_probes_per_frame: 48,
            upload_budget_bytes_per_frame: 256 * 1024,
            atlas_texels_per_update: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ProbeOutputMode {
    /// Accumulate L1 spherical harmonics per probe.
    Sh,
    /// Write one octahedral atlas texel per trace direction.
    Atlas,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct IntegratorConfig {
    pub mode: ProbeOutputMode,
    /// Edge length of a probe's octahedral tile; the direction table has `tile²` entries.
    pub octahedral_tile_size: u32,
    /// Radiance of an unoccluded sky, used for misses and for the skylight bounce.
    pub sky_color: [f32; 3],
    pub block_light_scale: f32,
    pub sky_bounce_scale: f32,
    /// Length of the secondary ray that tests whether a hit point sees the sky.
    pub sky_visibility_distance: f32,
    /// Offset along the hit normal for secondary rays.
    pub normal_bias: f32,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            mode: ProbeOutputMode::Sh,
            octahedral_tile_size: 8,
            sky_color: [0.6, 0.75, 1.0],
            block_light_scale: 1.0,
            sky_bounce_scale: 0.5,
            sky_visibility_distance: 64.0,
            normal_bias: 1e-3,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct TraceServiceConfig {
    /// Work items that may wait for a worker before `try_enqueue` starts rejecting.
    pub queue_capacity: usize,
    pub worker_count: usize,
}

impl Default for TraceServiceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            worker_count: 2,
        }
    }
}

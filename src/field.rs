use crate::config::{Config, FieldConfig};

use lucent_core::glam::{DVec3, Vec3A};
use lucent_core::FrameBudget;
use lucent_probes::{
    lifecycle_claim, ClipmapError, CpuProbeStore, ProbeIrradiance, ProbeRadiance, ProbeSampler, ProbeUploadSink,
    SkyRadiance, TraceIntegrator, TraceResult, TraceScene, TraceService, TraceServiceStats, TraceWorkItem,
    UpdateBudgets, UploadCostModel, WorldProbeScheduler,
};
use std::sync::Arc;

/// What happened during one [`ProbeField::update`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FrameStats {
    pub frame_index: u64,
    /// Levels whose window moved.
    pub anchor_shifts: usize,
    pub selected: usize,
    pub enqueued: usize,
    /// Selected probes that didn't fit in the work queue and were released.
    pub rejected: usize,
    /// Results applied to the scheduler and written to the store.
    pub completed: usize,
    /// Results dropped because their slot was reset since selection.
    pub discarded: usize,
    /// Results for probes that could not be traced; those probes go back to `Empty`.
    pub failed: usize,
    pub trace_limit: usize,
}

/// Drives the probe clipmap once per frame.
///
/// A `ProbeField` owns the scheduler, the trace service and a [`CpuProbeStore`]. Every call to
/// [`update`](ProbeField::update) re-centers the levels on the camera, queues a budgeted list of probes for tracing, and
/// applies whatever traces finished since the last frame. Updated probes can be read back from [`store`](ProbeField::store)
/// (or drained with [`CpuProbeStore::take_dirty`]) for upload.
pub struct ProbeField {
    field_config: FieldConfig,
    budgets: UpdateBudgets,
    base_spacing: f64,
    tile_size: u32,
    scheduler: WorldProbeScheduler,
    store: CpuProbeStore,
    service: TraceService,
    trace_budget: Option<FrameBudget>,
    frame_index: u64,
}

impl ProbeField {
    /// Guess for the first frames, before any traces were measured.
    const INITIAL_TRACE_TIME_ESTIMATE_US: u32 = 500;

    pub fn new<S>(config: Config, scene: Arc<S>, sky: Arc<dyn SkyRadiance>) -> Result<Self, ClipmapError>
    where
        S: TraceScene + ?Sized + 'static,
    {
        let integrator = TraceIntegrator::from_config(config.integrator, sky)?;
        let texels_per_probe = integrator.texels_per_update();
        let tile_size = integrator.atlas_tile_size();

        // The store doesn't override the sink's size estimates.
        let scheduler = WorldProbeScheduler::new(config.clipmap, UploadCostModel::default())?;
        let store = CpuProbeStore::new(
            scheduler.level_count(),
            scheduler.level(0).volume(),
            texels_per_probe as u32,
        );

        let service = TraceService::new(
            config.service,
            scene,
            integrator,
            lifecycle_claim(scheduler.lifecycle()),
        )?;

        let trace_budget = config.field.adaptive_trace_budget.then(|| {
            FrameBudget::new(
                config.service.worker_count as u32,
                config.field.target_trace_time_us,
                Self::INITIAL_TRACE_TIME_ESTIMATE_US,
            )
        });

        let mut budgets = config.budgets;
        budgets.atlas_texels_per_update = texels_per_probe;

        Ok(Self {
            field_config: config.field,
            budgets,
            base_spacing: config.clipmap.base_spacing,
            tile_size,
            scheduler,
            store,
            service,
            trace_budget,
            frame_index: 0,
        })
    }

    pub fn scheduler(&self) -> &WorldProbeScheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &CpuProbeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CpuProbeStore {
        &mut self.store
    }

    pub fn budgets(&self) -> &UpdateBudgets {
        &self.budgets
    }

    /// Takes effect on the next [`update`](Self::update). The atlas texel count is owned by the field and is kept.
    pub fn set_budgets(&mut self, budgets: UpdateBudgets) {
        let texels = self.budgets.atlas_texels_per_update;
        self.budgets = budgets;
        self.budgets.atlas_texels_per_update = texels;
    }

    /// Changing the base spacing resets every level.
    pub fn set_base_spacing(&mut self, base_spacing: f64) {
        self.base_spacing = base_spacing;
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn service_stats(&self) -> TraceServiceStats {
        self.service.stats()
    }

    pub fn update(&mut self, camera: DVec3) -> FrameStats {
        self.frame_index += 1;
        let frame_index = self.frame_index;
        let mut stats = FrameStats {
            frame_index,
            ..Default::default()
        };

        let base_spacing = self.base_spacing;
        self.scheduler
            .update_origins(camera, base_spacing, |_| stats.anchor_shifts += 1);

        let mut budgets = self.budgets.clone();
        if let Some(trace_budget) = &self.trace_budget {
            budgets.trace_max_probes_per_frame = budgets
                .trace_max_probes_per_frame
                .min(trace_budget.items_per_frame().max(1) as usize);
        }
        stats.trace_limit = budgets.trace_max_probes_per_frame;

        let requests = self
            .scheduler
            .build_update_list(frame_index, camera, base_spacing, &budgets);
        stats.selected = requests.len();

        for request in requests {
            let probe_pos_world = match self
                .scheduler
                .probe_world_position(request.level, request.local_index)
            {
                Some(p) => p,
                None => {
                    self.scheduler.release(&request);
                    continue;
                }
            };
            let spacing = self
                .scheduler
                .level_params(request.level)
                .map_or(base_spacing, |p| p.spacing);
            let item = TraceWorkItem {
                frame_index,
                request,
                probe_pos_world,
                max_trace_distance: self.field_config.max_trace_distance_probes * spacing as f32,
                octahedral_tile_size: self.tile_size,
            };
            if self.service.try_enqueue(item) {
                stats.enqueued += 1;
            } else {
                self.scheduler.release(&request);
                stats.rejected += 1;
            }
        }

        while let Some(result) = self.service.try_dequeue_result() {
            self.apply_result(result, &mut stats);
        }

        if let Some(trace_budget) = &mut self.trace_budget {
            trace_budget.update_estimate();
        }

        log::trace!("{:?}", stats);

        stats
    }

    fn apply_result(&mut self, result: TraceResult, stats: &mut FrameStats) {
        if let Some(trace_budget) = &mut self.trace_budget {
            trace_budget.complete_item(result.trace_time);
        }

        let request = result.request;
        if !self
            .scheduler
            .complete(&request, self.frame_index, result.success)
        {
            stats.discarded += 1;
            return;
        }
        if !result.success {
            stats.failed += 1;
            return;
        }

        let (level, slot) = (request.level, request.storage_linear_index);
        self.store.write_probe(level, slot, &result.record());
        if let ProbeRadiance::Atlas(samples) = &result.radiance {
            for (texel, sample) in samples.iter().enumerate() {
                self.store.write_texel(level, slot, texel as u32, *sample);
            }
        }
        stats.completed += 1;
    }

    /// Marks probes near edited blocks for retracing.
    pub fn invalidate_world_box(&mut self, min: DVec3, max: DVec3) -> usize {
        self.scheduler.invalidate_world_box(min, max)
    }

    pub fn sample_irradiance(&self, position: DVec3, normal: Vec3A, camera: DVec3) -> Option<ProbeIrradiance> {
        ProbeSampler::new(&self.scheduler, &self.store).sample_irradiance(position, normal, camera)
    }

    /// Stops the trace workers. Later updates still select probes but cannot trace them.
    pub fn shutdown(&mut self) {
        self.service.shutdown();
    }
}

mod level;
mod lifecycle;
mod origins;
mod update_list;

pub use level::{ClipmapLevel, ClipmapLevelParams};
pub use lifecycle::{ProbeLifecycleState, ProbeLifecycleTable, SlotWord, TICKET_MASK};
pub use origins::AnchorShifted;
pub use update_list::UpdateRequest;

use crate::config::ClipmapConfig;
use crate::error::ClipmapError;
use crate::topology::*;
use crate::upload::UploadCostModel;

use itertools::iproduct;
use lucent_core::glam::{DVec3, IVec3};
use std::sync::Arc;

pub const MAX_LEVELS: u32 = 16;
/// Keeps `resolution³` inside the 32-bit storage linear index.
pub const MAX_RESOLUTION: u32 = 1024;

/// Owns the probe clipmap: the placement of every level, and the lifecycle state of every storage slot.
///
/// All methods taking `&mut self` belong to the main thread, which calls them in the order `update_origins`,
/// `build_update_list`, then `complete` for every finished trace. Workers only need [`WorldProbeScheduler::lifecycle`]
/// to claim their requests, which they can do concurrently with anything the main thread is doing.
pub struct WorldProbeScheduler {
    config: ClipmapConfig,
    upload_cost: UploadCostModel,
    levels: Vec<ClipmapLevel>,
    lifecycle: Arc<ProbeLifecycleTable>,
    slot_frames: Vec<SlotFrames>,
    next_ticket: Vec<u32>,
}

/// Main-thread bookkeeping per slot, indexed by storage linear index.
struct SlotFrames {
    completed: Vec<u64>,
    selected: Vec<u64>,
    /// A trace completed since the slot last moved to a new probe position. The store's data for the slot stays usable
    /// while a retrace is pending.
    has_data: Vec<bool>,
}

impl WorldProbeScheduler {
    pub fn new(config: ClipmapConfig, upload_cost: UploadCostModel) -> Result<Self, ClipmapError> {
        if config.level_count == 0 {
            return Err(ClipmapError::NoLevels);
        }
        if config.level_count > MAX_LEVELS {
            return Err(ClipmapError::TooManyLevels(config.level_count));
        }
        if config.resolution == 0 {
            return Err(ClipmapError::ZeroResolution);
        }
        if config.resolution > MAX_RESOLUTION {
            return Err(ClipmapError::ResolutionTooLarge(config.resolution));
        }
        if !(config.base_spacing > 0.0 && config.base_spacing.is_finite()) {
            return Err(ClipmapError::InvalidBaseSpacing(config.base_spacing));
        }

        let levels: Vec<_> = (0..config.level_count)
            .map(|level| ClipmapLevel::new(level, config.resolution))
            .collect();
        let volume = levels[0].volume() as usize;

        log::debug!(
            "Creating probe clipmap with {} levels of {}³ probes",
            config.level_count,
            config.resolution
        );

        Ok(Self {
            lifecycle: Arc::new(ProbeLifecycleTable::new(levels.len(), volume)),
            slot_frames: (0..levels.len())
                .map(|_| SlotFrames {
                    completed: vec![0; volume],
                    selected: vec![0; volume],
                    has_data: vec![false; volume],
                })
                .collect(),
            next_ticket: vec![1; levels.len()],
            levels,
            config,
            upload_cost,
        })
    }

    pub fn config(&self) -> &ClipmapConfig {
        &self.config
    }

    pub fn upload_cost(&self) -> &UploadCostModel {
        &self.upload_cost
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn resolution(&self) -> u32 {
        self.config.resolution
    }

    pub fn level(&self, level: u32) -> &ClipmapLevel {
        &self.levels[level as usize]
    }

    /// `None` until the first `update_origins`.
    pub fn level_params(&self, level: u32) -> Option<ClipmapLevelParams> {
        self.levels[level as usize].params()
    }

    /// The table workers claim requests through.
    pub fn lifecycle(&self) -> Arc<ProbeLifecycleTable> {
        Arc::clone(&self.lifecycle)
    }

    /// States of every slot on `level`, in storage order.
    pub fn lifecycle_snapshot(&self, level: u32) -> Vec<ProbeLifecycleState> {
        self.lifecycle.snapshot(level)
    }

    pub fn slot_state(&self, level: u32, storage_linear_index: u32) -> ProbeLifecycleState {
        self.lifecycle.state(level, storage_linear_index)
    }

    pub fn probe_state(&self, level: u32, local_index: IVec3) -> ProbeLifecycleState {
        let linear = self.levels[level as usize].local_to_linear(local_index);
        self.lifecycle.state(level, linear)
    }

    /// World position of the probe at `local_index`, or `None` if the level was never placed.
    pub fn probe_world_position(&self, level: u32, local_index: IVec3) -> Option<DVec3> {
        self.levels[level as usize].probe_center(local_index)
    }

    /// The slot's probe has traced data that can be sampled, even while it is `Stale`, `Queued` or `InFlight` for a
    /// retrace.
    pub fn slot_has_data(&self, level: u32, storage_linear_index: u32) -> bool {
        self.slot_frames[level as usize].has_data[storage_linear_index as usize]
    }

    pub fn last_completed_frame(&self, level: u32, storage_linear_index: u32) -> u64 {
        self.slot_frames[level as usize].completed[storage_linear_index as usize]
    }

    /// Valid probes on `level` become stale when their age exceeds this many frames. Coarser levels tolerate
    /// proportionally older data.
    pub fn stale_threshold_frames(&self, level: u32) -> u64 {
        self.config
            .stale_after_frames
            .saturating_mul(1u64 << level.min(63))
    }

    /// `Queued → InFlight`. Fails when the slot was reset or reselected since `request` was issued.
    pub fn try_claim(&self, request: &UpdateRequest, frame_index: u64) -> bool {
        let claimed = self.lifecycle.try_claim(request);
        if !claimed {
            log::trace!(
                "Frame {}: claim of level {} slot {} failed",
                frame_index,
                request.level,
                request.storage_linear_index
            );
        }
        claimed
    }

    /// Applies a finished trace: `InFlight → Valid` on success, `InFlight → Empty` on failure so the probe is retried.
    ///
    /// Returns `false` if the slot no longer belongs to `request` (it was reset by an origin shift or timed out), in which
    /// case the result must be discarded.
    pub fn complete(&mut self, request: &UpdateRequest, frame_index: u64, success: bool) -> bool {
        if !self.request_in_bounds(request) {
            log::warn!("Ignoring completion of out-of-bounds request {:?}", request);
            return false;
        }

        let in_flight = SlotWord::new(ProbeLifecycleState::InFlight, request.ticket);
        let next = if success {
            ProbeLifecycleState::Valid
        } else {
            ProbeLifecycleState::Empty
        };
        let applied = self.lifecycle.transition(
            request.level,
            request.storage_linear_index,
            in_flight,
            SlotWord::new(next, request.ticket),
        );

        if !applied {
            log::debug!(
                "Frame {}: dropping result for level {} slot {}, now {:?}",
                frame_index,
                request.level,
                request.storage_linear_index,
                self.lifecycle.word(request.level, request.storage_linear_index)
            );
            return false;
        }
        if success {
            let frames = &mut self.slot_frames[request.level as usize];
            frames.completed[request.storage_linear_index as usize] = frame_index;
            frames.has_data[request.storage_linear_index as usize] = true;
        }

        true
    }

    /// `Queued → Empty` for a request that will never reach a worker, e.g. because the work queue was full.
    pub fn release(&mut self, request: &UpdateRequest) -> bool {
        if !self.request_in_bounds(request) {
            return false;
        }
        self.lifecycle.transition(
            request.level,
            request.storage_linear_index,
            SlotWord::new(ProbeLifecycleState::Queued, request.ticket),
            SlotWord::new(ProbeLifecycleState::Empty, request.ticket),
        )
    }

    /// Marks `Valid` probes with centers inside the world-space box `[min, max]` as `Stale`, regardless of age. Returns
    /// the number of probes that changed.
    pub fn invalidate_world_box(&mut self, min: DVec3, max: DVec3) -> usize {
        let res = self.config.resolution as i32;
        let mut count = 0;
        for level in self.levels.iter() {
            let p = match level.placement() {
                Some(p) => *p,
                None => continue,
            };
            // Probe i is inside when min <= origin + (i + 0.5) * spacing <= max.
            let lo = (min - p.origin) / p.spacing - DVec3::splat(0.5);
            let hi = (max - p.origin) / p.spacing - DVec3::splat(0.5);
            let axis_range = |lo: f64, hi: f64| {
                let first = (lo.ceil().max(0.0)) as i32;
                let last = (hi.floor().min((res - 1) as f64)) as i32;
                first..(last + 1).max(first)
            };
            for (z, y, x) in iproduct!(
                axis_range(lo.z, hi.z),
                axis_range(lo.y, hi.y),
                axis_range(lo.x, hi.x)
            ) {
                let linear = level.local_to_linear(IVec3::new(x, y, z));
                let word = self.lifecycle.word(level.level(), linear);
                if word.state != ProbeLifecycleState::Valid {
                    continue;
                }
                let stale = SlotWord::new(ProbeLifecycleState::Stale, word.ticket);
                if self.lifecycle.transition(level.level(), linear, word, stale) {
                    count += 1;
                }
            }
        }
        log::debug!("Invalidated {} probes in [{:?}, {:?}]", count, min, max);
        count
    }

    /// Every slot on `level` becomes `Empty`.
    pub(crate) fn reset_level_slots(&mut self, level: u32) {
        for linear in 0..self.levels[level as usize].volume() {
            self.reset_slot(level, linear);
        }
    }

    /// The slot now holds a different probe, so its old data is dropped too.
    pub(crate) fn reset_slot(&mut self, level: u32, linear_index: u32) {
        self.slot_frames[level as usize].has_data[linear_index as usize] = false;
        self.empty_slot(level, linear_index);
    }

    /// Keeps the ticket, so outstanding requests for the slot fail their claim and completion.
    pub(crate) fn empty_slot(&mut self, level: u32, linear_index: u32) {
        let word = self.lifecycle.word(level, linear_index);
        self.lifecycle.store(
            level,
            linear_index,
            SlotWord::new(ProbeLifecycleState::Empty, word.ticket),
        );
    }

    /// Tickets skip zero, which only ever marks slots that were never selected.
    pub(crate) fn take_ticket(&mut self, level: u32) -> u32 {
        let next = &mut self.next_ticket[level as usize];
        let ticket = *next;
        *next = (*next + 1) & TICKET_MASK;
        if *next == 0 {
            *next = 1;
        }
        ticket
    }

    fn request_in_bounds(&self, request: &UpdateRequest) -> bool {
        self.levels
            .get(request.level as usize)
            .map_or(false, |l| request.storage_linear_index < l.volume())
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

use super::lifecycle::{ProbeLifecycleState, SlotWord};
use super::WorldProbeScheduler;
use crate::config::UpdateBudgets;
use crate::topology::*;

use float_ord::FloatOrd;
use lucent_core::glam::{DVec3, IVec3};
use std::collections::BinaryHeap;

/// A probe selected for retracing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UpdateRequest {
    pub level: u32,
    /// Position in the level's window at selection time.
    pub local_index: IVec3,
    pub storage_index: IVec3,
    pub storage_linear_index: u32,
    /// Identifies this selection of the slot; claims and completions for any other selection are rejected.
    pub ticket: u32,
}

impl WorldProbeScheduler {
    /// Selects the probes to retrace this frame and marks them `Queued`.
    ///
    /// Levels are visited from finest to coarsest. Within a level, `Empty` probes come before `Stale` ones, and probes
    /// closer to `camera` come first, with the storage index as the final tie-break, so the output is a pure function of
    /// the inputs and the scheduler's state. `Valid` probes older than [`WorldProbeScheduler::stale_threshold_frames`]
    /// become `Stale` during the scan even if the budget doesn't allow retracing them yet.
    ///
    /// The output never exceeds `budgets.per_level[L]` for a level `L`, `budgets.trace_max_probes_per_frame`, or the
    /// number of probe uploads that fit in `budgets.upload_budget_bytes_per_frame`.
    pub fn build_update_list(
        &mut self,
        frame_index: u64,
        camera: DVec3,
        base_spacing: f64,
        budgets: &UpdateBudgets,
    ) -> Vec<UpdateRequest> {
        let bytes_per_update = self
            .upload_cost
            .bytes_per_update(budgets.atlas_texels_per_update);
        let upload_limit = if bytes_per_update == 0 {
            usize::MAX
        } else {
            budgets.upload_budget_bytes_per_frame / bytes_per_update
        };
        let mut remaining = budgets.trace_max_probes_per_frame.min(upload_limit);

        let mut requests = Vec::new();
        for level in 0..self.levels.len() as u32 {
            if remaining == 0 {
                break;
            }
            let level_budget = budgets
                .per_level
                .get(level as usize)
                .copied()
                .unwrap_or(0)
                .min(remaining);
            if level_budget == 0 {
                continue;
            }

            let expected_spacing = level_spacing(base_spacing, level);
            match self.levels[level as usize].placement() {
                Some(p) if p.spacing == expected_spacing => (),
                _ => {
                    log::trace!(
                        "Level {} is not placed for base spacing {}; skipping",
                        level,
                        base_spacing
                    );
                    continue;
                }
            }

            let num_before = requests.len();
            self.select_level_updates(level, frame_index, camera, level_budget, &mut requests);
            remaining -= requests.len() - num_before;
        }

        log::trace!(
            "Frame {}: selected {} probe updates",
            frame_index,
            requests.len()
        );

        requests
    }

    fn select_level_updates(
        &mut self,
        level: u32,
        frame_index: u64,
        camera: DVec3,
        budget: usize,
        requests: &mut Vec<UpdateRequest>,
    ) {
        let placement = match self.levels[level as usize].placement() {
            Some(p) => *p,
            None => return,
        };
        let res = self.config.resolution as i32;
        let stale_after = self.stale_threshold_frames(level);
        let claim_timeout = self.config.claim_timeout_frames;
        let volume = self.levels[level as usize].volume();

        // Max-heap holding the best `budget` candidates seen so far; the worst sits on top.
        let mut heap = BinaryHeap::with_capacity(budget.min(volume as usize) + 1);
        for linear_index in 0..volume {
            let word = self.lifecycle.word(level, linear_index);
            let priority = match word.state {
                ProbeLifecycleState::Empty => Priority::Empty,
                ProbeLifecycleState::Stale => Priority::Stale,
                ProbeLifecycleState::Valid => {
                    let completed = self.slot_frames[level as usize].completed[linear_index as usize];
                    if frame_index.saturating_sub(completed) <= stale_after {
                        continue;
                    }
                    let stale = SlotWord::new(ProbeLifecycleState::Stale, word.ticket);
                    if !self.lifecycle.transition(level, linear_index, word, stale) {
                        continue;
                    }
                    Priority::Stale
                }
                ProbeLifecycleState::Queued | ProbeLifecycleState::InFlight => {
                    let selected = self.slot_frames[level as usize].selected[linear_index as usize];
                    if claim_timeout == 0 || frame_index.saturating_sub(selected) <= claim_timeout {
                        continue;
                    }
                    log::warn!(
                        "Level {} slot {} has been {:?} since frame {}; resetting",
                        level,
                        linear_index,
                        word.state,
                        selected
                    );
                    self.empty_slot(level, linear_index);
                    Priority::Empty
                }
            };

            let storage_index = self.levels[level as usize].delinearize(linear_index);
            let local_index = storage_to_local(storage_index, placement.ring_offset, res);
            let center = index_to_probe_center_world(local_index, placement.origin, placement.spacing);
            heap.push(Candidate {
                priority,
                distance_sq: FloatOrd(center.distance_squared(camera)),
                linear_index,
            });
            if heap.len() > budget {
                heap.pop();
            }
        }

        for candidate in heap.into_sorted_vec() {
            let linear_index = candidate.linear_index;
            // Only this thread writes Empty and Stale slots, so the observed word can't have changed.
            let word = self.lifecycle.word(level, linear_index);
            let ticket = self.take_ticket(level);
            let queued = SlotWord::new(ProbeLifecycleState::Queued, ticket);
            if !self.lifecycle.transition(level, linear_index, word, queued) {
                continue;
            }
            self.slot_frames[level as usize].selected[linear_index as usize] = frame_index;

            let storage_index = self.levels[level as usize].delinearize(linear_index);
            requests.push(UpdateRequest {
                level,
                local_index: storage_to_local(storage_index, placement.ring_offset, res),
                storage_index,
                storage_linear_index: linear_index,
                ticket: queued.ticket,
            });
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Priority {
    Empty,
    Stale,
}

/// Ordered by priority class, then distance to the camera, then storage index.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
struct Candidate {
    priority: Priority,
    distance_sq: FloatOrd<f64>,
    linear_index: u32,
}

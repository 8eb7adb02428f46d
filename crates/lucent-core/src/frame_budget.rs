use crate::work_timer::WorkTimer;

use std::time::Duration;

/// Estimates how many work items fit into a frame, given a target amount of CPU time per frame spread over some number of
/// worker threads.
///
/// The per-item estimate is a moving average of the measured item times from previous frames, so a sudden spike of slow
/// items (e.g. long rays over open terrain) only shrinks the budget gradually.
pub struct FrameBudget {
    num_threads: u32,
    item_time_estimate_us: u32,
    target_frame_time_us: u32,
    timer: WorkTimer,
}

impl FrameBudget {
    /// Weight of the newest frame's average in the moving estimate, as a fraction of 256.
    const SMOOTHING_WEIGHT_256: u64 = 64;

    pub fn new(
        num_threads: u32,
        target_frame_time_us: u32,
        initial_item_time_estimate_us: u32,
    ) -> Self {
        Self {
            num_threads: num_threads.max(1),
            target_frame_time_us,
            item_time_estimate_us: initial_item_time_estimate_us.max(1),
            timer: WorkTimer::start(),
        }
    }

    pub fn complete_item(&mut self, cpu_time: Duration) {
        self.timer.complete_item(cpu_time);
    }

    /// Folds the items measured since the last call into the estimate and starts a new measurement window.
    pub fn update_estimate(&mut self) {
        let timer = std::mem::replace(&mut self.timer, WorkTimer::start());
        if timer.items_completed() == 0 {
            return;
        }
        let measured = u64::from(timer.average_cpu_time_us().max(1));
        let previous = u64::from(self.item_time_estimate_us);
        let blended = (measured * Self::SMOOTHING_WEIGHT_256
            + previous * (256 - Self::SMOOTHING_WEIGHT_256))
            / 256;
        self.item_time_estimate_us = blended.max(1) as u32;
    }

    pub fn item_time_estimate_us(&self) -> u32 {
        self.item_time_estimate_us
    }

    pub fn items_per_frame(&self) -> u32 {
        (self.target_frame_time_us * self.num_threads) / self.item_time_estimate_us.max(1)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

use std::time::Duration;

/// Accumulates the CPU time spent on individual work items (probe traces) within one measurement window.
#[derive(Clone, Debug, Default)]
pub struct WorkTimer {
    total_cpu_time: Duration,
    items_completed: u32,
}

impl WorkTimer {
    pub fn start() -> Self {
        Self::default()
    }

    pub fn items_completed(&self) -> u32 {
        self.items_completed
    }

    pub fn complete_item(&mut self, d: Duration) {
        self.total_cpu_time += d;
        self.items_completed += 1;
    }

    pub fn average_cpu_time_us(&self) -> u32 {
        let total_us: u32 = self
            .total_cpu_time
            .as_micros()
            .try_into()
            .unwrap_or(u32::MAX);

        total_us / self.items_completed.max(1)
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

    #[test]
    fn average_ignores_empty_window() {
        let timer = WorkTimer::start();
        assert_eq!(timer.average_cpu_time_us(), 0);

        let mut timer = WorkTimer::start();
        timer.complete_item(Duration::from_micros(100));
        timer.complete_item(Duration::from_micros(300));
        assert_eq!(timer.items_completed(), 2);
        assert_eq!(timer.average_cpu_time_us(), 200);
    }
}

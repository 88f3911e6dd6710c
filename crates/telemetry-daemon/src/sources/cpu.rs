//! Busy-share computation over cumulative CPU tick counters.

/// Previous (total, idle) tick counters of a CPU source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CpuBaseline {
    prev: Option<(u64, u64)>,
}

impl CpuBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sample and returns the busy percentage since the previous one.
    ///
    /// The first sample only establishes the baseline and reports 0. Counters
    /// that did not advance, or went backwards, also report 0.
    pub fn usage(&mut self, total: u64, idle: u64) -> f64 {
        let Some((prev_total, prev_idle)) = self.prev.replace((total, idle)) else {
            return 0.0;
        };

        let total_delta = total.saturating_sub(prev_total);
        if total_delta == 0 {
            return 0.0;
        }
        let idle_delta = idle.saturating_sub(prev_idle);
        let busy = total_delta.saturating_sub(idle_delta);
        100.0 * busy as f64 / total_delta as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_baseline() {
        let mut cpu = CpuBaseline::new();
        assert_eq!(cpu.usage(1000, 800), 0.0);
        assert_eq!(cpu.usage(1100, 850), 50.0);
        assert_eq!(cpu.usage(1200, 950), 0.0);
    }

    #[test]
    fn test_stalled_or_reset_counters() {
        let mut cpu = CpuBaseline::new();
        cpu.usage(1000, 800);
        assert_eq!(cpu.usage(1000, 800), 0.0);
        // Counters reset, e.g. after CPU hotplug.
        assert_eq!(cpu.usage(10, 5), 0.0);
        assert_eq!(cpu.usage(110, 5), 100.0);
    }
}

//! Synthetic source for hosts without a native implementation.

use telemetry_core::{unix_time_ms, MetricSnapshot, Result};

use super::MetricSource;

const MEM_TOTAL_KB: u64 = 512 * 1024;

/// Produces smooth synthetic signals derived from wall time.
pub struct SimulatedSource {
    start_ms: u64,
}

impl SimulatedSource {
    /// Creates a new simulated source; uptime counts from now.
    pub fn new() -> Self {
        Self {
            start_ms: unix_time_ms(),
        }
    }

    fn sample_at(&self, now_ms: u64, snapshot: &mut MetricSnapshot) {
        // Ten minute period keeps the phase small.
        let t = (now_ms % 600_000) as f64 / 1000.0;

        snapshot.set_cpu_usage(20.0 + 30.0 * (t * 0.7).sin());
        snapshot.mem_total_kb = MEM_TOTAL_KB;
        snapshot.mem_available_kb = ((256.0 + 64.0 * (t * 0.2).sin()) * 1024.0) as u64;
        snapshot.temperature_c = 45.0 + 8.0 * (t * 0.1).sin();
        snapshot.uptime_s = now_ms.saturating_sub(self.start_ms) / 1000;
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
        self.sample_at(unix_time_ms(), snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        let source = SimulatedSource { start_ms: 1_000 };
        for step in 0..200 {
            let mut snap = MetricSnapshot::default();
            source.sample_at(1_000 + step * 3_137, &mut snap);
            assert!((0.0..=100.0).contains(&snap.cpu_usage_pct));
            assert_eq!(snap.mem_total_kb, MEM_TOTAL_KB);
            assert!(snap.mem_available_kb <= MEM_TOTAL_KB);
            assert!((37.0..=53.0).contains(&snap.temperature_c));
        }
    }

    #[test]
    fn test_uptime_counts_from_start() {
        let source = SimulatedSource { start_ms: 10_000 };
        let mut snap = MetricSnapshot::default();
        source.sample_at(75_500, &mut snap);
        assert_eq!(snap.uptime_s, 65);
    }

    #[test]
    fn test_always_ok() {
        let mut source = SimulatedSource::new();
        let mut snap = MetricSnapshot::default();
        assert!(source.collect(&mut snap).is_ok());
        assert_eq!(snap.ts_ms, 0);
    }
}

//! Point-in-time metric readings.

use serde::{Deserialize, Serialize};

/// One consistent set of metric readings.
///
/// Every field defaults to zero when no source could provide it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Collection timestamp in milliseconds since the Unix epoch
    pub ts_ms: u64,
    /// CPU busy share over the last sampling interval (0-100)
    pub cpu_usage_pct: f64,
    /// Total memory in kB
    pub mem_total_kb: u64,
    /// Available memory in kB, 0 if unknown
    pub mem_available_kb: u64,
    /// Temperature in degrees Celsius
    pub temperature_c: f64,
    /// Host uptime in seconds
    pub uptime_s: u64,
}

impl MetricSnapshot {
    /// Creates an empty snapshot stamped with the given time.
    pub fn at(ts_ms: u64) -> Self {
        Self {
            ts_ms,
            ..Self::default()
        }
    }

    /// Sets the CPU usage, clamped to 0-100.
    pub fn set_cpu_usage(&mut self, pct: f64) {
        self.cpu_usage_pct = clamp_pct(pct);
    }
}

/// Clamps a percentage to 0-100, mapping NaN to 0.
pub fn clamp_pct(pct: f64) -> f64 {
    if pct.is_nan() {
        0.0
    } else {
        pct.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at() {
        let snap = MetricSnapshot::at(42);
        assert_eq!(snap.ts_ms, 42);
        assert_eq!(snap.mem_total_kb, 0);
        assert_eq!(snap.cpu_usage_pct, 0.0);
    }

    #[test]
    fn test_cpu_clamped() {
        let mut snap = MetricSnapshot::default();
        snap.set_cpu_usage(140.0);
        assert_eq!(snap.cpu_usage_pct, 100.0);
        snap.set_cpu_usage(-3.0);
        assert_eq!(snap.cpu_usage_pct, 0.0);
        snap.set_cpu_usage(f64::NAN);
        assert_eq!(snap.cpu_usage_pct, 0.0);
    }
}

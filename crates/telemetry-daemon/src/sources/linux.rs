//! Linux sources backed by procfs and sysfs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use telemetry_core::{Error, MetricSnapshot, Result};

use super::cpu::CpuBaseline;
use super::MetricSource;

const THERMAL_ZONE_TEMP: &str = "sys/class/thermal/thermal_zone0/temp";

/// Reads a whole procfs/sysfs file.
///
/// A missing or inaccessible file means the metric is unavailable on this host.
fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => {
            Error::Unavailable(format!("open {} failed: {}", path.display(), e))
        }
        _ => Error::Io(format!("read {} failed: {}", path.display(), e)),
    })
}

/// CPU usage source computing busy share between two reads of `/proc/stat`.
pub struct LinuxCpuSource {
    stat_path: PathBuf,
    baseline: CpuBaseline,
}

impl LinuxCpuSource {
    /// Creates a new CPU source reading the host's `/proc/stat`.
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Creates a CPU source under an alternate filesystem root.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            stat_path: root.as_ref().join("proc/stat"),
            baseline: CpuBaseline::new(),
        }
    }

    /// Parses the aggregate `cpu` line into (total, idle) jiffies.
    fn parse_cpu_line(content: &str) -> Option<(u64, u64)> {
        let line = content.lines().next()?;
        let mut fields = line.split_whitespace();
        if fields.next()? != "cpu" {
            return None;
        }

        // user nice system idle iowait irq softirq steal
        let mut counters = [0u64; 8];
        let mut parsed = 0;
        for (slot, field) in counters.iter_mut().zip(fields) {
            match field.parse() {
                Ok(v) => {
                    *slot = v;
                    parsed += 1;
                }
                Err(_) => break,
            }
        }
        if parsed < 4 {
            return None;
        }

        let [user, nice, system, idle, iowait, irq, softirq, steal] = counters;
        let idle_all = idle + iowait;
        let non_idle = user + nice + system + irq + softirq + steal;
        Some((idle_all + non_idle, idle_all))
    }
}

impl Default for LinuxCpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for LinuxCpuSource {
    fn name(&self) -> &str {
        "linux_cpu"
    }

    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
        let content = read_source(&self.stat_path)?;
        let (total, idle) = Self::parse_cpu_line(&content)
            .ok_or_else(|| Error::Io("parse /proc/stat failed".to_string()))?;

        snapshot.set_cpu_usage(self.baseline.usage(total, idle));
        Ok(())
    }
}

/// Memory source reading `MemTotal` and `MemAvailable` from `/proc/meminfo`.
pub struct LinuxMemInfoSource {
    meminfo_path: PathBuf,
}

impl LinuxMemInfoSource {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            meminfo_path: root.as_ref().join("proc/meminfo"),
        }
    }

    fn field_kb(content: &str, key: &str) -> Option<u64> {
        content
            .lines()
            .find_map(|line| line.strip_prefix(key))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|v| v.parse().ok())
    }
}

impl Default for LinuxMemInfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for LinuxMemInfoSource {
    fn name(&self) -> &str {
        "linux_meminfo"
    }

    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
        let content = read_source(&self.meminfo_path)?;
        let total = Self::field_kb(&content, "MemTotal:")
            .ok_or_else(|| Error::Io("parse MemTotal failed".to_string()))?;
        let available = Self::field_kb(&content, "MemAvailable:")
            .ok_or_else(|| Error::Io("parse MemAvailable failed".to_string()))?;

        snapshot.mem_total_kb = total;
        snapshot.mem_available_kb = available;
        Ok(())
    }
}

/// Uptime source reading `/proc/uptime`.
pub struct LinuxUptimeSource {
    uptime_path: PathBuf,
}

impl LinuxUptimeSource {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            uptime_path: root.as_ref().join("proc/uptime"),
        }
    }
}

impl Default for LinuxUptimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for LinuxUptimeSource {
    fn name(&self) -> &str {
        "linux_uptime"
    }

    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
        let content = read_source(&self.uptime_path)?;
        let uptime: f64 = content
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Io("parse /proc/uptime failed".to_string()))?;

        snapshot.uptime_s = uptime.max(0.0) as u64;
        Ok(())
    }
}

/// Temperature source reading the first thermal zone.
pub struct LinuxTemperatureSource {
    temp_path: PathBuf,
}

impl LinuxTemperatureSource {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            temp_path: root.as_ref().join(THERMAL_ZONE_TEMP),
        }
    }
}

impl Default for LinuxTemperatureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for LinuxTemperatureSource {
    fn name(&self) -> &str {
        "linux_temperature"
    }

    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
        let content = read_source(&self.temp_path)?;
        let milli_c: i64 = content
            .trim()
            .parse()
            .map_err(|_| Error::Io("parse thermal temp failed".to_string()))?;

        snapshot.temperature_c = milli_c as f64 / 1000.0;
        Ok(())
    }
}

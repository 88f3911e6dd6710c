//! Metric sources.
//!
//! Each source owns a subset of the snapshot fields and fills them from one
//! platform mechanism.

mod cpu;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
mod simulated;
#[cfg(windows)]
mod windows;

#[cfg(target_os = "linux")]
pub use linux::{LinuxCpuSource, LinuxMemInfoSource, LinuxTemperatureSource, LinuxUptimeSource};
#[cfg(target_os = "macos")]
pub use macos::{MacCpuSource, MacMemorySource, MacTemperatureSource, MacUptimeSource};
pub use simulated::SimulatedSource;
#[cfg(windows)]
pub use windows::{
    WindowsCpuSource, WindowsMemorySource, WindowsTemperatureSource, WindowsUptimeSource,
};

use serde::{Deserialize, Serialize};
use telemetry_core::{MetricSnapshot, Result};

use crate::collector::Collector;

/// Trait for all metric sources.
pub trait MetricSource: Send {
    /// Returns the source name, for diagnostics.
    fn name(&self) -> &str;

    /// Writes the fields this source owns into `snapshot`.
    ///
    /// Returns `Unavailable` when the metric cannot be produced here at all and
    /// `Io` when an expected data source could not be read or parsed.
    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()>;
}

/// Which set of sources the daemon installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceSelection {
    /// Native sources for the build platform, simulated elsewhere
    #[default]
    Auto,
    /// Synthetic values only
    Simulated,
}

impl std::fmt::Display for SourceSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSelection::Auto => write!(f, "auto"),
            SourceSelection::Simulated => write!(f, "simulated"),
        }
    }
}

/// Adds the default set of metric sources to the collector.
pub fn add_default_sources(collector: &mut Collector, selection: SourceSelection) {
    match selection {
        SourceSelection::Simulated => collector.add_source(Box::new(SimulatedSource::new())),
        SourceSelection::Auto => add_native_sources(collector),
    }
}

#[cfg(target_os = "linux")]
fn add_native_sources(collector: &mut Collector) {
    collector.add_source(Box::new(LinuxCpuSource::new()));
    collector.add_source(Box::new(LinuxMemInfoSource::new()));
    collector.add_source(Box::new(LinuxUptimeSource::new()));
    collector.add_source(Box::new(LinuxTemperatureSource::new()));
}

#[cfg(target_os = "macos")]
fn add_native_sources(collector: &mut Collector) {
    collector.add_source(Box::new(MacCpuSource::new()));
    collector.add_source(Box::new(MacMemorySource));
    collector.add_source(Box::new(MacUptimeSource));
    collector.add_source(Box::new(MacTemperatureSource));
}

#[cfg(windows)]
fn add_native_sources(collector: &mut Collector) {
    collector.add_source(Box::new(WindowsCpuSource::new()));
    collector.add_source(Box::new(WindowsMemorySource));
    collector.add_source(Box::new(WindowsUptimeSource));
    collector.add_source(Box::new(WindowsTemperatureSource));
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
fn add_native_sources(collector: &mut Collector) {
    collector.add_source(Box::new(SimulatedSource::new()));
}

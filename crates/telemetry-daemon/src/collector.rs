//! Best-effort aggregation of metric sources into one snapshot.

use telemetry_core::{unix_time_ms, Error, MetricSnapshot, Result};
use tracing::{debug, warn};

use crate::sources::MetricSource;

/// A snapshot together with the aggregate outcome that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub snapshot: MetricSnapshot,
    pub outcome: Result<()>,
}

/// Owns an ordered list of sources; insertion order is collection order.
#[derive(Default)]
pub struct Collector {
    sources: Vec<Box<dyn MetricSource>>,
}

impl Collector {
    /// Creates a collector without sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source. No deduplication.
    pub fn add_source(&mut self, source: Box<dyn MetricSource>) {
        self.sources.push(source);
    }

    /// Returns the source names in collection order.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Collects a snapshot stamped with the current time.
    pub fn collect(&mut self) -> Collection {
        self.collect_at(unix_time_ms())
    }

    /// Runs every source against a fresh snapshot stamped with `ts_ms`.
    ///
    /// All sources always run. The aggregate outcome is the first hard failure
    /// in insertion order; `Unavailable` never degrades it.
    pub fn collect_at(&mut self, ts_ms: u64) -> Collection {
        let mut snapshot = MetricSnapshot::at(ts_ms);
        let mut outcome = Ok(());
        let mut failed = Vec::new();

        for source in self.sources.iter_mut() {
            // Only a successful source commits its writes.
            let mut scratch = snapshot;
            match source.collect(&mut scratch) {
                Ok(()) => snapshot = scratch,
                Err(e) if e.is_soft() => {
                    debug!("Source {} unavailable: {}", source.name(), e);
                }
                Err(e) => {
                    debug!("Source {} failed: {}", source.name(), e);
                    failed.push(source.name().to_string());
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
            }
        }

        if let Err(e) = &outcome {
            warn!("{}", failure_summary(&failed, e));
        }

        // Sources never own the timestamp.
        snapshot.ts_ms = ts_ms;
        Collection { snapshot, outcome }
    }
}

/// One line describing every hard failure of a collection.
fn failure_summary(failed: &[String], first: &Error) -> String {
    format!("Collection failed in [{}]: {}", failed.join(", "), first)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use telemetry_core::StatusCode;

    /// Test source with a scripted outcome that counts its invocations.
    pub(crate) struct ScriptedSource {
        name: &'static str,
        outcome: Result<()>,
        write: fn(&mut MetricSnapshot),
        pub(crate) calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        pub(crate) fn new(name: &'static str, outcome: Result<()>, write: fn(&mut MetricSnapshot)) -> Self {
            Self {
                name,
                outcome,
                write,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl MetricSource for ScriptedSource {
        fn name(&self) -> &str {
            self.name
        }

        fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.write)(snapshot);
            self.outcome.clone()
        }
    }

    fn mem(s: &mut MetricSnapshot) {
        s.mem_total_kb = 123;
        s.mem_available_kb = 45;
    }

    fn uptime(s: &mut MetricSnapshot) {
        s.uptime_s = 77;
    }

    fn temperature(s: &mut MetricSnapshot) {
        s.temperature_c = 99.0;
    }

    fn nothing(_: &mut MetricSnapshot) {}

    #[test]
    fn test_unavailable_is_swallowed() {
        let mut c = Collector::new();
        c.add_source(Box::new(ScriptedSource::new("mem", Ok(()), mem)));
        c.add_source(Box::new(ScriptedSource::new(
            "temp",
            Err(Error::Unavailable("nope".into())),
            nothing,
        )));
        c.add_source(Box::new(ScriptedSource::new("uptime", Ok(()), uptime)));

        let collection = c.collect_at(1000);
        assert_eq!(collection.outcome, Ok(()));
        assert_eq!(collection.snapshot.ts_ms, 1000);
        assert_eq!(collection.snapshot.mem_total_kb, 123);
        assert_eq!(collection.snapshot.mem_available_kb, 45);
        assert_eq!(collection.snapshot.uptime_s, 77);
    }

    #[test]
    fn test_first_hard_error_wins_without_short_circuit() {
        let sources = vec![
            ScriptedSource::new("mem", Ok(()), mem),
            ScriptedSource::new("soft", Err(Error::Unavailable("soft".into())), nothing),
            ScriptedSource::new("io", Err(Error::Io("bad".into())), nothing),
            ScriptedSource::new("internal", Err(Error::Internal("worse".into())), nothing),
            ScriptedSource::new("uptime", Ok(()), uptime),
        ];
        let counters: Vec<_> = sources.iter().map(|s| s.calls.clone()).collect();

        let mut c = Collector::new();
        for s in sources {
            c.add_source(Box::new(s));
        }

        let collection = c.collect();
        assert_eq!(collection.outcome, Err(Error::Io("bad".into())));
        assert_eq!(StatusCode::from_outcome(&collection.outcome), StatusCode::IoError);
        assert_eq!(collection.snapshot.mem_total_kb, 123);
        assert_eq!(collection.snapshot.uptime_s, 77);
        for calls in counters {
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_failed_source_writes_are_discarded() {
        let mut c = Collector::new();
        c.add_source(Box::new(ScriptedSource::new(
            "half-written",
            Err(Error::Io("parse failed".into())),
            temperature,
        )));
        c.add_source(Box::new(ScriptedSource::new(
            "soft-half-written",
            Err(Error::Unavailable("gone".into())),
            mem,
        )));

        let collection = c.collect_at(5);
        assert_eq!(collection.snapshot.temperature_c, 0.0);
        assert_eq!(collection.snapshot.mem_total_kb, 0);
    }

    #[test]
    fn test_invalid_argument_is_hard() {
        let mut c = Collector::new();
        c.add_source(Box::new(ScriptedSource::new(
            "bad",
            Err(Error::InvalidArgument("zone".into())),
            nothing,
        )));
        c.add_source(Box::new(ScriptedSource::new("io", Err(Error::Io("x".into())), nothing)));
        let collection = c.collect_at(1);
        assert_eq!(
            StatusCode::from_outcome(&collection.outcome),
            StatusCode::InvalidArgument
        );
    }

    #[test]
    fn test_no_sources() {
        let mut c = Collector::new();
        let collection = c.collect_at(9);
        assert_eq!(collection.outcome, Ok(()));
        assert_eq!(collection.snapshot, MetricSnapshot::at(9));
    }

    #[test]
    fn test_failure_summary_names_every_failed_source() {
        let failed = vec!["linux_cpu".to_string(), "linux_meminfo".to_string()];
        assert_eq!(
            failure_summary(&failed, &Error::Io("parse /proc/stat failed".into())),
            "Collection failed in [linux_cpu, linux_meminfo]: I/O error: parse /proc/stat failed"
        );
    }
}

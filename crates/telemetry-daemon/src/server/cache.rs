//! Throttled snapshot cache between the server and the collector.

use std::time::Duration;

use telemetry_core::MetricsResponse;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::collector::{Collection, Collector};

/// Cached metrics as served to one `GET`.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedMetrics {
    pub collection: Collection,
    pub throttle_ms: u32,
}

impl CachedMetrics {
    /// Builds the wire payload.
    pub fn to_response(&self) -> MetricsResponse {
        MetricsResponse::new(
            &self.collection.snapshot,
            &self.collection.outcome,
            self.throttle_ms,
        )
    }
}

struct CacheState {
    collector: Collector,
    throttle_ms: u32,
    /// Last collection and the monotonic instant it was started
    last: Option<(Collection, Instant)>,
}

impl CacheState {
    /// Applies the caching policy at monotonic time `now`.
    ///
    /// The window is measured on the monotonic clock, so wall-clock steps
    /// only affect the `ts_ms` stamped on new snapshots.
    fn get_at(&mut self, now: Instant) -> CachedMetrics {
        let window = Duration::from_millis(u64::from(self.throttle_ms));
        let collection = match &self.last {
            Some((cached, collected_at)) if now.saturating_duration_since(*collected_at) < window => {
                cached.clone()
            }
            _ => {
                debug!("Collecting metrics");
                let collection = self.collector.collect();
                self.last = Some((collection.clone(), now));
                collection
            }
        };

        CachedMetrics {
            collection,
            throttle_ms: self.throttle_ms,
        }
    }
}

/// Owns the collector and the last collection behind one lock.
///
/// Check, collect and store happen under the same guard, so concurrent `GET`s
/// trigger at most one real collection per throttle window.
pub struct MetricsCache {
    state: Mutex<CacheState>,
}

impl MetricsCache {
    /// Creates a cache; the first `snapshot` always collects.
    pub fn new(collector: Collector, throttle_ms: u32) -> Self {
        Self {
            state: Mutex::new(CacheState {
                collector,
                throttle_ms,
                last: None,
            }),
        }
    }

    /// Returns the cached collection, collecting first if the throttle window elapsed.
    pub async fn snapshot(&self) -> CachedMetrics {
        self.state.lock().await.get_at(Instant::now())
    }

    /// Sets the minimum interval between two real collections and returns the previous one.
    pub async fn set_throttle(&self, throttle_ms: u32) -> u32 {
        std::mem::replace(&mut self.state.lock().await.throttle_ms, throttle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::tests::ScriptedSource;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use telemetry_core::{unix_time_ms, Error, MetricSnapshot};

    fn state_with(source: ScriptedSource, throttle_ms: u32) -> CacheState {
        let mut collector = Collector::new();
        collector.add_source(Box::new(source));
        CacheState {
            collector,
            throttle_ms,
            last: None,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_reuses_within_window() {
        let source = ScriptedSource::new("ok", Ok(()), |s| s.uptime_s = 1);
        let calls = source.calls.clone();
        let mut state = state_with(source, 250);
        let start = Instant::now();

        let first = state.get_at(start);
        let second = state.get_at(start + ms(249));
        assert_eq!(first, second);
        assert_eq!(second.collection.snapshot.uptime_s, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        state.get_at(start + ms(250));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_outcome_is_cached_too() {
        let source = ScriptedSource::new("io", Err(Error::Io("bad".into())), |_| {});
        let mut state = state_with(source, 1000);
        let start = Instant::now();
        let first = state.get_at(start);
        let second = state.get_at(start + ms(1));
        assert_eq!(second.collection.outcome, Err(Error::Io("bad".into())));
        assert_eq!(first, second);
        assert!(!second.to_response().ok);
    }

    #[test]
    fn test_zero_throttle_always_collects() {
        let source = ScriptedSource::new("ok", Ok(()), |_| {});
        let calls = source.calls.clone();
        let mut state = state_with(source, 0);
        let now = Instant::now();
        state.get_at(now);
        state.get_at(now);
        state.get_at(now);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_wall_clock_step_back_does_not_extend_window() {
        let source = ScriptedSource::new("ok", Ok(()), |_| {});
        let calls = source.calls.clone();
        let mut state = state_with(source, 250);
        let start = Instant::now();

        // Cached entry stamped one hour ahead of the current wall clock.
        let stale_ts = unix_time_ms() + 3_600_000;
        let stale = Collection {
            snapshot: MetricSnapshot::at(stale_ts),
            outcome: Ok(()),
        };
        state.last = Some((stale, start));

        let served = state.get_at(start + ms(600));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(served.collection.snapshot.ts_ms < stale_ts);
    }

    #[tokio::test]
    async fn test_throttle_change_applies_to_next_snapshot() {
        let source = ScriptedSource::new("ok", Ok(()), |_| {});
        let calls = source.calls.clone();
        let mut collector = Collector::new();
        collector.add_source(Box::new(source));
        let cache = Arc::new(MetricsCache::new(collector, 60_000));

        let first = cache.snapshot().await;
        assert_eq!(first.throttle_ms, 60_000);
        let again = cache.snapshot().await;
        assert_eq!(first.collection, again.collection);

        assert_eq!(cache.set_throttle(0).await, 60_000);
        let fresh = cache.snapshot().await;
        assert_eq!(fresh.throttle_ms, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_snapshots_collect_once() {
        let source = ScriptedSource::new("ok", Ok(()), |_| {});
        let calls = source.calls.clone();
        let mut collector = Collector::new();
        collector.add_source(Box::new(source));
        let cache = Arc::new(MetricsCache::new(collector, 60_000));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move { cache.snapshot().await }));
        }
        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }
}

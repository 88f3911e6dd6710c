//! Wall-clock helpers.

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_time_ms() -> u64 {
    // Pre-epoch clocks report 0.
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

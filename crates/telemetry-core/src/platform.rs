//! Static host capability report.

/// Name of the platform this binary was built for.
pub const PLATFORM_NAME: &str = if cfg!(target_os = "windows") {
    "windows"
} else if cfg!(target_os = "macos") {
    "macos"
} else if cfg!(target_os = "linux") {
    "linux"
} else {
    "unknown"
};

/// Whether a best-effort temperature reading is supported on this platform.
pub const TEMPERATURE_BEST_EFFORT: bool = cfg!(target_os = "linux");

//! Telemetry Core Library
//!
//! Shared metric model, outcome codes and the line-oriented command protocol
//! spoken between the telemetry daemon and its clients.

pub mod error;
pub mod platform;
pub mod protocol;
pub mod response;
pub mod snapshot;
pub mod time;

pub use error::{Error, Result, StatusCode};
pub use platform::{PLATFORM_NAME, TEMPERATURE_BEST_EFFORT};
pub use protocol::{parse_command, Command, CommandKind, ParsedCommand, ProtocolError};
pub use response::{MetricsResponse, Response};
pub use snapshot::MetricSnapshot;
pub use time::unix_time_ms;

/// Default TCP port of the daemon.
pub const DEFAULT_PORT: u16 = 9000;

/// Default minimum interval between two real collections.
pub const DEFAULT_THROTTLE_MS: u32 = 250;

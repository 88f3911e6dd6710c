//! Line protocol definitions and parsing.
//!
//! Protocol structure:
//! - One ASCII command per line, terminated by `\n` (a trailing `\r` is ignored)
//! - Commands are case-sensitive and matched exactly: `PING`, `GET`, `RESTART`, `THROTTLE <ms>`
//! - Every response is a single JSON line (see [`crate::response`])

use thiserror::Error;

/// Largest accepted `THROTTLE` argument in milliseconds.
pub const MAX_THROTTLE_MS: u32 = 60_000;

const THROTTLE_PREFIX: &str = "THROTTLE ";

/// Command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Ping,
    Get,
    Restart,
    Throttle,
    Unknown,
}

/// A successfully parsed command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Liveness check.
    Ping,
    /// Fetch the (possibly cached) metrics snapshot.
    Get,
    /// Ask for a service restart. Acknowledged only.
    Restart,
    /// Set the minimum interval between two real collections.
    Throttle(u32),
    /// Any unrecognized line. Not an error by itself.
    Unknown,
}

impl Command {
    /// Returns the kind of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Ping => CommandKind::Ping,
            Command::Get => CommandKind::Get,
            Command::Restart => CommandKind::Restart,
            Command::Throttle(_) => CommandKind::Throttle,
            Command::Unknown => CommandKind::Unknown,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Ping => write!(f, "PING"),
            Command::Get => write!(f, "GET"),
            Command::Restart => write!(f, "RESTART"),
            Command::Throttle(ms) => write!(f, "{}{}", THROTTLE_PREFIX, ms),
            Command::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Validation failures of a `THROTTLE` line.
///
/// The messages are sent verbatim to clients.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("missing ms")]
    MissingMs,

    #[error("invalid ms")]
    InvalidMs,

    #[error("ms too large")]
    MsTooLarge,
}

impl ProtocolError {
    /// Returns the kind of the command that failed validation.
    pub fn kind(&self) -> CommandKind {
        CommandKind::Throttle
    }
}

/// Result of parsing one line.
pub type ParsedCommand = std::result::Result<Command, ProtocolError>;

/// Parses a single line (no trailing `\n`, any trailing `\r` already stripped).
pub fn parse_command(line: &str) -> ParsedCommand {
    match line {
        "PING" => return Ok(Command::Ping),
        "GET" => return Ok(Command::Get),
        "RESTART" => return Ok(Command::Restart),
        _ => {}
    }

    match line.strip_prefix(THROTTLE_PREFIX) {
        Some(arg) => parse_throttle_ms(arg).map(Command::Throttle),
        None => Ok(Command::Unknown),
    }
}

fn parse_throttle_ms(arg: &str) -> std::result::Result<u32, ProtocolError> {
    if arg.is_empty() {
        return Err(ProtocolError::MissingMs);
    }

    // Digits are checked left to right, so an out-of-range prefix wins over a later bad byte.
    let mut ms: u32 = 0;
    for b in arg.bytes() {
        if !b.is_ascii_digit() {
            return Err(ProtocolError::InvalidMs);
        }
        ms = ms * 10 + u32::from(b - b'0');
        if ms > MAX_THROTTLE_MS {
            return Err(ProtocolError::MsTooLarge);
        }
    }
    Ok(ms)
}

//! Error and outcome types shared by the daemon and its clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Non-Ok outcomes of collecting metrics or running the server.
///
/// Cloneable so a collection outcome can be cached and replayed verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The metric or feature cannot be produced here. Soft failure.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Bad configuration or argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A read, write or syscall failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Should not happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the numeric outcome kind of this error.
    pub fn code(&self) -> StatusCode {
        match self {
            Error::Unavailable(_) => StatusCode::Unavailable,
            Error::InvalidArgument(_) => StatusCode::InvalidArgument,
            Error::Io(_) => StatusCode::IoError,
            Error::Internal(_) => StatusCode::Internal,
        }
    }

    /// Returns true for failures that never degrade an aggregate outcome.
    pub fn is_soft(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// Numeric outcome kind, as reported in the `status_code` response field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum StatusCode {
    #[default]
    Ok = 0,
    Unavailable = 1,
    InvalidArgument = 2,
    IoError = 3,
    Internal = 4,
}

impl StatusCode {
    /// Returns the kind of an outcome.
    pub fn from_outcome(outcome: &Result<()>) -> Self {
        match outcome {
            Ok(()) => StatusCode::Ok,
            Err(e) => e.code(),
        }
    }
}

impl From<StatusCode> for u8 {
    fn from(code: StatusCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::Unavailable),
            2 => Ok(StatusCode::InvalidArgument),
            3 => Ok(StatusCode::IoError),
            4 => Ok(StatusCode::Internal),
            _ => Err(format!("unknown status code: {}", value)),
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::Ok => write!(f, "ok"),
            StatusCode::Unavailable => write!(f, "unavailable"),
            StatusCode::InvalidArgument => write!(f, "invalid-argument"),
            StatusCode::IoError => write!(f, "io-error"),
            StatusCode::Internal => write!(f, "internal"),
        }
    }
}

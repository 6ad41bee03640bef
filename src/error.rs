use thiserror::Error;

use crate::driver::DriverError;
use crate::protocol::ProtocolError;

/// Failures reported back to the browser in a failure envelope.
///
/// The `Display` output is the envelope's `error` text, so the fixed
/// variants render the exact strings clients match on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    #[error("database not connected")]
    NotConnected,

    #[error("invalid command")]
    InvalidCommand,

    #[error("invalid url")]
    InvalidUrl,

    #[error("unknown action")]
    UnknownAction,

    #[error("unsupported operation")]
    Unsupported,

    /// Whatever the database driver reported, verbatim.
    #[error("{0}")]
    Driver(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("internal error")]
    Internal,
}

pub type BrowserResult<T> = Result<T, BrowserError>;

impl From<ProtocolError> for BrowserError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidCommand => BrowserError::InvalidCommand,
            ProtocolError::InvalidUrl => BrowserError::InvalidUrl,
            ProtocolError::UnknownAction(_) => BrowserError::UnknownAction,
            other => BrowserError::Protocol(other.to_string()),
        }
    }
}

impl From<DriverError> for BrowserError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Unsupported => BrowserError::Unsupported,
            DriverError::InvalidUrl(_) => BrowserError::InvalidUrl,
            other => BrowserError::Driver(other.to_string()),
        }
    }
}

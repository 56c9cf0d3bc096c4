//! Error types for monitor client operations

use agent_monitor_core::PreconditionError;
use thiserror::Error;

/// Result type alias for monitor client operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur while monitoring an agent's logs
///
/// Cloneable so a terminal error can be published alongside controller status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Invalid or ambiguous selection, raised before any connection
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// The fetch capability rejected the credentials
    #[error("Authorization rejected ({status}): {message}")]
    Authorization { status: u16, message: String },

    /// Transient transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed or unexpected payload from the endpoint
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Bounded retry budget used up
    #[error("Gave up after {attempts} attempt(s): {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// The controller was stopped before the operation completed
    #[error("Controller stopped")]
    Cancelled,

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl MonitorError {
    /// Create a protocol error from a message
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create an error from a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Authorization { status, message },
            408 | 429 | 500..=599 => Self::Network(format!("server returned {status}: {message}")),
            _ => Self::Protocol(format!("unexpected status {status}: {message}")),
        }
    }

    /// Whether a retry with the same parameters may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return Self::Protocol(err.to_string());
        }
        Self::Network(err.to_string())
    }
}

impl From<url::ParseError> for MonitorError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

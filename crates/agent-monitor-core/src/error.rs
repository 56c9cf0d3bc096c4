//! Caller-misuse errors for monitor selection

use thiserror::Error;

/// Result type for selection and lifecycle preconditions
pub type PreconditionResult<T> = Result<T, PreconditionError>;

/// A monitor was asked to do something its current selection cannot support
///
/// These are never retried. They are raised before any connection is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    /// Both a client id and a server id were given
    #[error("Provide a client OR a server to monitor, not both")]
    AmbiguousTarget,

    /// Neither a client id nor a server id was given
    #[error("Provide a client or a server to monitor")]
    MissingTarget,

    /// A target id was present but empty
    #[error("Target id must not be empty")]
    EmptyTargetId,

    /// A session operation needs a configured target first
    #[error("Monitor session is not configured")]
    NotConfigured,

    /// `attach` was called on a session that already has a controller
    #[error("Monitor session is already attached")]
    AlreadyAttached,

    /// An operation needs an attached session
    #[error("Monitor session is not attached")]
    NotAttached,

    /// Range fetches need a controller built in paged mode
    #[error("Controller is not in paged mode")]
    NotPaged,
}

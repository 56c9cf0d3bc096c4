//! Monitor target models (which agent's logs to stream)

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PreconditionError, PreconditionResult};

/// Role of the agent process being monitored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A client agent
    Client,
    /// A server agent
    Server,
}

impl TargetKind {
    /// Query parameter key that carries the target id
    pub fn query_key(self) -> &'static str {
        match self {
            TargetKind::Client => "client_id",
            TargetKind::Server => "server_id",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Client => f.write_str("client"),
            TargetKind::Server => f.write_str("server"),
        }
    }
}

/// The agent whose logs are monitored
///
/// Exactly one of client or server, never both and never neither.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Target {
    /// Client agent, by id
    Client(String),
    /// Server agent, by id
    Server(String),
}

impl Target {
    /// Create a client target
    pub fn client(id: impl Into<String>) -> PreconditionResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(PreconditionError::EmptyTargetId);
        }
        Ok(Self::Client(id))
    }

    /// Create a server target
    pub fn server(id: impl Into<String>) -> PreconditionResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(PreconditionError::EmptyTargetId);
        }
        Ok(Self::Server(id))
    }

    /// Build a target from two optional ids (e.g. command-line flags)
    pub fn from_parts(client: Option<&str>, server: Option<&str>) -> PreconditionResult<Self> {
        match (client, server) {
            (Some(_), Some(_)) => Err(PreconditionError::AmbiguousTarget),
            (Some(id), None) => Self::client(id),
            (None, Some(id)) => Self::server(id),
            (None, None) => Err(PreconditionError::MissingTarget),
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Client(_) => TargetKind::Client,
            Target::Server(_) => TargetKind::Server,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Target::Client(id) | Target::Server(id) => id,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

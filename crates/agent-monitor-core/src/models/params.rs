//! Request parameters derived from a monitor selection

use serde::{Deserialize, Serialize};

use super::level::LogLevel;
use super::target::Target;

/// Query string pairs sent to the monitor endpoint
pub type Query = Vec<(String, String)>;

/// How the controller talks to the endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// One long-lived connection, continuous push
    #[default]
    Streaming,
    /// Discrete bounded fetches on demand
    Paged,
}

impl StreamMode {
    pub fn toggled(self) -> Self {
        match self {
            StreamMode::Streaming => StreamMode::Paged,
            StreamMode::Paged => StreamMode::Streaming,
        }
    }
}

/// Body encoding produced by the endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Concatenated JSON frames carrying base64 `Data`
    #[default]
    Framed,
    /// Raw UTF-8 text (`plain=true`)
    Plain,
}

impl PayloadFormat {
    /// Extra query pairs this format needs
    pub fn query(self) -> Query {
        match self {
            PayloadFormat::Framed => Vec::new(),
            PayloadFormat::Plain => vec![("plain".to_string(), "true".to_string())],
        }
    }
}

/// Parameters for one monitor request
///
/// Always rebuilt from the selection, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorParams {
    pub target: Target,
    pub log_level: LogLevel,
}

impl MonitorParams {
    pub fn new(target: Target, log_level: LogLevel) -> Self {
        Self { target, log_level }
    }

    /// Query pairs: the target discriminant key with its id, then the level
    pub fn to_query(&self) -> Query {
        vec![
            (
                self.target.kind().query_key().to_string(),
                self.target.id().to_string(),
            ),
            ("log_level".to_string(), self.log_level.to_string()),
        ]
    }
}

/// Delimiter spliced between buffer segments when the level changes
///
/// Empty when there is no previous output to separate from.
pub fn transition_marker(previous: &str, level: LogLevel) -> String {
    if previous.is_empty() {
        return String::new();
    }
    let lead = if previous.ends_with('\n') { "" } else { "\n" };
    format!("{lead}...changing log level to {level}...\n\n")
}

//! Bounded range requests for paged (scrollback) mode

use serde::{Deserialize, Serialize};

use super::params::Query;

/// Where a range offset is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Start,
    End,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Start => "start",
            Origin::End => "end",
        }
    }
}

/// Where fetched text lands in the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Older output, goes in front
    Prepend,
    /// Newer output, goes at the end
    Append,
}

/// One bounded fetch against the monitor endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub origin: Origin,
    pub offset: u64,
    pub limit: u64,
    pub placement: Placement,
}

impl PageRequest {
    /// First `limit` bytes of the log
    pub fn head(limit: u64) -> Self {
        Self {
            origin: Origin::Start,
            offset: 0,
            limit,
            placement: Placement::Append,
        }
    }

    /// Last `limit` bytes of the log
    pub fn tail(limit: u64) -> Self {
        Self {
            origin: Origin::End,
            offset: limit,
            limit,
            placement: Placement::Append,
        }
    }

    /// `limit` bytes ending at `offset` from the start, placed in front
    pub fn before(offset: u64, limit: u64) -> Self {
        Self {
            origin: Origin::Start,
            offset: offset.saturating_sub(limit),
            limit: limit.min(offset),
            placement: Placement::Prepend,
        }
    }

    /// `limit` bytes starting at `offset` from the start, placed at the end
    pub fn after(offset: u64, limit: u64) -> Self {
        Self {
            origin: Origin::Start,
            offset,
            limit,
            placement: Placement::Append,
        }
    }

    pub fn to_query(&self) -> Query {
        vec![
            ("origin".to_string(), self.origin.as_str().to_string()),
            ("offset".to_string(), self.offset.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ]
    }
}

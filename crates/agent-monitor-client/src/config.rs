//! Monitor configuration: endpoint, payload format and retry policy
//!
//! Can be loaded from TOML or constructed programmatically. Every field has a
//! default, so an empty table is a valid configuration.

use std::time::Duration;

use agent_monitor_core::{PayloadFormat, StreamMode};
use serde::{Deserialize, Serialize};

/// Default monitor endpoint path
pub const DEFAULT_ENDPOINT: &str = "/v1/agent/monitor";

/// Bounded exponential backoff
///
/// Attempt `n` (1-based) waits `base_delay * 2^(n-1)`. Retrying gives up
/// once `n` exceeds `max_attempts` or the delay would exceed `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first failure
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Backoff ceiling, in milliseconds
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Policy for reconnecting an interrupted stream
    pub const fn reconnect() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }

    /// Policy for retrying a single page fetch
    pub const fn page() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }

    /// Delay before retry `attempt`, or `None` once the budget is spent
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        // 2^(attempt-1), saturating instead of overflowing on large attempts
        let multiplier = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        if delay_ms > self.max_delay_ms {
            return None;
        }
        Some(Duration::from_millis(delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::reconnect()
    }
}

fn default_page_retry() -> RetryPolicy {
    RetryPolicy::page()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Monitor client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Endpoint path on the agent API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Body encoding to request
    #[serde(default)]
    pub format: PayloadFormat,

    /// Reconnect policy for streaming mode
    #[serde(default)]
    pub reconnect: RetryPolicy,

    /// Per-request retry policy for paged mode
    #[serde(default = "default_page_retry")]
    pub page_retry: RetryPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            format: PayloadFormat::default(),
            reconnect: RetryPolicy::reconnect(),
            page_retry: RetryPolicy::page(),
        }
    }
}

impl MonitorConfig {
    /// Controller options for the given mode
    pub fn controller_options(&self, mode: StreamMode) -> ControllerOptions {
        ControllerOptions {
            mode,
            format: self.format,
            reconnect: self.reconnect,
            page_retry: self.page_retry,
        }
    }
}

/// Construction options for one log stream controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub mode: StreamMode,
    pub format: PayloadFormat,
    pub reconnect: RetryPolicy,
    pub page_retry: RetryPolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        MonitorConfig::default().controller_options(StreamMode::Streaming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
        };
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_millis(800)));
        assert_eq!(policy.delay_for(6), None);
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn test_backoff_ceiling_ends_retries() {
        let policy = RetryPolicy {
            max_attempts: 100,
            base_delay_ms: 1_000,
            max_delay_ms: 4_000,
        };
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_for(4), None);
        assert_eq!(policy.delay_for(90), None);
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: MonitorConfig = toml::from_str("").unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.endpoint, "/v1/agent/monitor");
        assert_eq!(config.page_retry, RetryPolicy::page());
    }

    #[test]
    fn test_partial_toml() {
        let config: MonitorConfig = toml::from_str(
            r#"
            format = "plain"

            [reconnect]
            max_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.format, PayloadFormat::Plain);
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.reconnect.base_delay_ms, 1_000);

        let options = config.controller_options(StreamMode::Paged);
        assert_eq!(options.mode, StreamMode::Paged);
        assert_eq!(options.format, PayloadFormat::Plain);
    }
}

//! Configuration file handling for agent-monitor

use agent_monitor_client::MonitorConfig;
use agent_monitor_core::LogLevel;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default agent address
pub const DEFAULT_ADDRESS: &str = "http://localhost:4646";

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default agent address
    pub address: Option<String>,
    /// Access token sent with every request
    pub token: Option<String>,
    /// Default log level
    pub level: Option<LogLevel>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Endpoint, payload format and retry policies
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("agent-monitor");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        address: Option<&str>,
        token: Option<&str>,
        level: Option<LogLevel>,
        no_color: bool,
    ) -> MergedConfig {
        MergedConfig {
            address: address
                .map(String::from)
                .or_else(|| self.address.clone())
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            token: token.map(String::from).or_else(|| self.token.clone()),
            level: level.or(self.level).unwrap_or_default(),
            no_color: no_color || self.no_color.unwrap_or(false),
            monitor: self.monitor.clone(),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub address: String,
    pub token: Option<String>,
    pub level: LogLevel,
    pub no_color: bool,
    pub monitor: MonitorConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_monitor_core::PayloadFormat;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
address = "http://agent:4646"
token = "secret"
level = "debug"

[monitor]
format = "plain"

[monitor.reconnect]
max_attempts = 2
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.address.as_deref(), Some("http://agent:4646"));
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.level, Some(LogLevel::Debug));
        assert_eq!(config.monitor.format, PayloadFormat::Plain);
        assert_eq!(config.monitor.reconnect.max_attempts, 2);
        assert_eq!(config.monitor.reconnect.base_delay_ms, 1_000);
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_args_override_file() {
        let config = Config {
            address: Some("http://file:4646".to_string()),
            token: Some("file-token".to_string()),
            level: Some(LogLevel::Warn),
            ..Config::default()
        };

        let merged = config.merge_with_args(
            Some("http://flag:4646"),
            None,
            Some(LogLevel::Trace),
            false,
        );
        assert_eq!(merged.address, "http://flag:4646");
        assert_eq!(merged.token.as_deref(), Some("file-token"));
        assert_eq!(merged.level, LogLevel::Trace);
        assert!(!merged.no_color);
    }

    #[test]
    fn test_defaults_when_unset() {
        let merged = Config::default().merge_with_args(None, None, None, true);
        assert_eq!(merged.address, DEFAULT_ADDRESS);
        assert_eq!(merged.token, None);
        assert_eq!(merged.level, LogLevel::Info);
        assert!(merged.no_color);
        assert_eq!(merged.monitor, MonitorConfig::default());
    }
}

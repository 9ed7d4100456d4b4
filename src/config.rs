//! Configuration for listing-watch.
//!
//! Loaded from an optional TOML file; every key has a default.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::poll::SessionSettings;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub batch_size: usize,
    pub delivery_timeout: Duration,
    pub user_agent: String,
    pub log_level: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        let session = SessionSettings::default();
        Self {
            poll_interval: session.poll_interval,
            fetch_timeout: session.fetch_timeout,
            batch_size: session.batch_size,
            delivery_timeout: session.delivery_timeout,
            user_agent: concat!("listing-watch/", env!("CARGO_PKG_VERSION")).to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl WatchConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        let config = Self::from(file);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.poll_interval.is_zero(), "poll_interval_secs must be positive");
        anyhow::ensure!(!self.fetch_timeout.is_zero(), "fetch_timeout_secs must be positive");
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        anyhow::ensure!(
            !self.delivery_timeout.is_zero(),
            "delivery_timeout_secs must be positive"
        );
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            poll_interval: self.poll_interval,
            fetch_timeout: self.fetch_timeout,
            batch_size: self.batch_size,
            delivery_timeout: self.delivery_timeout,
        }
    }
}

/// On-disk shape.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    poll_interval_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    batch_size: Option<usize>,
    delivery_timeout_secs: Option<u64>,
    user_agent: Option<String>,
    log_level: Option<String>,
}

impl From<TomlConfig> for WatchConfig {
    fn from(file: TomlConfig) -> Self {
        let defaults = WatchConfig::default();
        Self {
            poll_interval: file
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            fetch_timeout: file
                .fetch_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            batch_size: file.batch_size.unwrap_or(defaults.batch_size),
            delivery_timeout: file
                .delivery_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.delivery_timeout),
            user_agent: file.user_agent.unwrap_or(defaults.user_agent),
            log_level: file.log_level.unwrap_or(defaults.log_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = WatchConfig::from_toml_str("").unwrap();
        assert_eq!(config, WatchConfig::default());
        assert_eq!(config.poll_interval, Duration::from_secs(20));
        assert_eq!(config.batch_size, 20);
    }

    #[test]
    fn overrides_are_applied() {
        let config = WatchConfig::from_toml_str(
            r#"
poll_interval_secs = 60
fetch_timeout_secs = 5
batch_size = 10
delivery_timeout_secs = 8
user_agent = "test-agent"
log_level = "debug"
"#,
        )
        .unwrap();

        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.delivery_timeout, Duration::from_secs(8));
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.log_level, "debug");

        let session = config.session_settings();
        assert_eq!(session.batch_size, 10);
        assert_eq!(session.poll_interval, Duration::from_secs(60));
        assert_eq!(session.delivery_timeout, Duration::from_secs(8));
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(WatchConfig::from_toml_str("poll_interval_secs = 0").is_err());
        assert!(WatchConfig::from_toml_str("batch_size = 0").is_err());
        assert!(WatchConfig::from_toml_str("delivery_timeout_secs = 0").is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(WatchConfig::from_toml_str("poll_every = 3").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(WatchConfig::from_file("/definitely/not/here.toml").is_err());
    }
}

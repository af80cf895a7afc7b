use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use common_config::apply_override;
use common_obs::LogFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_STORE_PATH: &str = "TOKENWATCH_STORE_PATH";
pub const ENV_POLL_MS: &str = "TOKENWATCH_POLL_MS";
pub const ENV_TICK_MS: &str = "TOKENWATCH_TICK_MS";
pub const ENV_LOG_FORMAT: &str = "TOKENWATCH_LOG_FORMAT";
pub const ENV_LOG_FILTER: &str = "TOKENWATCH_LOG_FILTER";

/// Configuration for the tokenwatch runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenwatchConfig {
    /// Where tokens are read from.
    pub store: StoreConfig,
    /// Diagnostics panel knobs.
    pub panel: PanelConfig,
    /// Logging configuration.
    pub telemetry: TelemetryConfig,
}

/// Error type for configuration related failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl TokenwatchConfig {
    /// Load the configuration from a TOML file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Persist the configuration to a TOML file on disk.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let serialized = toml::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    /// Load from `path` when given, otherwise start from defaults, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_environment_overrides();
        Ok(config)
    }

    pub fn apply_environment_overrides(&mut self) {
        apply_override(ENV_STORE_PATH, &mut self.store.path);
        apply_override(ENV_POLL_MS, &mut self.store.poll_interval_ms);
        apply_override(ENV_TICK_MS, &mut self.panel.tick_interval_ms);
        apply_override(ENV_LOG_FORMAT, &mut self.telemetry.log_format);

        let mut filter = String::new();
        apply_override(ENV_LOG_FILTER, &mut filter);
        if !filter.is_empty() {
            self.telemetry.log_filter = Some(filter);
        }
    }
}

/// File-backed token store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file holding the tokens.
    pub path: PathBuf,
    /// How often the file is polled for external changes.
    pub poll_interval_ms: u64,
}

impl StoreConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tokens.json"),
            poll_interval_ms: 500,
        }
    }
}

/// Diagnostics panel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub tick_interval_ms: u64,
    pub access_key: String,
    pub refresh_key: String,
    /// Capacity of the refresh-status event bus.
    pub event_capacity: usize,
}

impl PanelConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            access_key: "authToken".into(),
            refresh_key: "refreshToken".into(),
            event_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tokenwatch.toml");

        let mut config = TokenwatchConfig::default();
        config.store.path = PathBuf::from("/var/lib/tokenwatch/tokens.json");
        config.panel.tick_interval_ms = 250;
        config.telemetry.log_format = LogFormat::Compact;
        config.telemetry.log_filter = Some("tokenwatch=debug".into());
        config.to_file(&path).expect("write config");

        let loaded = TokenwatchConfig::from_file(&path).expect("read config");
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: TokenwatchConfig = toml::from_str(
            r#"
            [panel]
            tick_interval_ms = 100
            "#,
        )
        .expect("parse");

        assert_eq!(config.panel.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.panel.access_key, "authToken");
        assert_eq!(config.panel.refresh_key, "refreshToken");
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }

    #[test]
    fn environment_overrides_apply() {
        std::env::set_var(ENV_STORE_PATH, "/tmp/override.json");
        std::env::set_var(ENV_TICK_MS, "50");
        std::env::set_var(ENV_LOG_FORMAT, "compact");
        std::env::set_var(ENV_LOG_FILTER, "debug");

        let config = TokenwatchConfig::load(None).expect("load");

        std::env::remove_var(ENV_STORE_PATH);
        std::env::remove_var(ENV_TICK_MS);
        std::env::remove_var(ENV_LOG_FORMAT);
        std::env::remove_var(ENV_LOG_FILTER);

        assert_eq!(config.store.path, PathBuf::from("/tmp/override.json"));
        assert_eq!(config.panel.tick_interval_ms, 50);
        assert_eq!(config.telemetry.log_format, LogFormat::Compact);
        assert_eq!(config.telemetry.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = TokenwatchConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

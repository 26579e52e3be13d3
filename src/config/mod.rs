//! Configuration parsing and validation.
//!
//! Handles loading configuration from YAML files with environment variable
//! interpolation. Configuration is loaded once at process start and is
//! immutable for the process lifetime.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyApiKeySnafu, EmptyLogStreamSnafu, EmptyNamespaceSnafu, EmptySourceHostSnafu,
    EnvInterpolationSnafu, ReadFileSnafu, YamlParseSnafu,
};

/// Main configuration structure for the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub metric_sink: MetricSinkConfig,
    pub log_sink: LogSinkConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Internal telemetry configuration (optional, enabled by default).
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Source API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Hostname of the array management API (e.g. "vpsa.example.com").
    pub host: String,

    /// Static credential sent as the `X-Access-Key` header.
    pub api_key: String,

    /// Sampling interval in seconds passed to usage queries (default: 30).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Page size for log record queries (default: 100).
    #[serde(default = "default_log_page_size")]
    pub log_page_size: usize,

    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_log_page_size() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

/// Metric sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSinkConfig {
    /// Base URL of the metric sink API.
    pub endpoint: String,

    /// Namespace every forwarded point is tagged with.
    pub namespace: String,
}

/// Log sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSinkConfig {
    /// Base URL of the log sink API.
    pub endpoint: String,

    /// Name of the stream array events are appended to.
    pub stream: String,
}

/// Checkpoint store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Path of the durable checkpoint file.
    #[serde(default = "default_checkpoint_path")]
    pub path: String,

    /// Explicit checkpoint key. When unset the key is derived from the
    /// source host so each source identity gets its own value.
    #[serde(default)]
    pub key: Option<String>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: default_checkpoint_path(),
            key: None,
        }
    }
}

fn default_checkpoint_path() -> String {
    "checkpoint.json".to_string()
}

/// Internal telemetry configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether the Prometheus endpoint is enabled (default: true).
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    /// Address to bind the telemetry HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_telemetry_address")]
    pub address: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            address: default_telemetry_address(),
        }
    }
}

fn default_telemetry_enabled() -> bool {
    true
}

fn default_telemetry_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment
    /// variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let content = if interpolate_env {
            match vars::interpolate(&content) {
                Ok(text) => text,
                Err(errors) => {
                    return EnvInterpolationSnafu {
                        message: errors.join("\n"),
                    }
                    .fail();
                }
            }
        } else {
            content
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.host.is_empty(), EmptySourceHostSnafu);
        ensure!(!self.source.api_key.is_empty(), EmptyApiKeySnafu);
        ensure!(!self.metric_sink.namespace.is_empty(), EmptyNamespaceSnafu);
        ensure!(!self.log_sink.stream.is_empty(), EmptyLogStreamSnafu);
        Ok(())
    }

    /// The checkpoint key for this source identity.
    ///
    /// Uses the explicit key when configured, otherwise derives a stable key
    /// from the source host.
    pub fn checkpoint_key(&self) -> String {
        match &self.checkpoint.key {
            Some(key) => key.clone(),
            None => format!("vpsa/{}/last-forwarded-id", self.source.host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
source:
  host: "vpsa.example.com"
  api_key: "secret"

metric_sink:
  endpoint: "https://metrics.example.com"
  namespace: "ZadaraVPSA"

log_sink:
  endpoint: "https://logs.example.com"
  stream: "vpsa-events"
"#
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.source.host, "vpsa.example.com");
        assert_eq!(config.source.interval_secs, 30);
        assert_eq!(config.source.log_page_size, 100);
        assert_eq!(config.checkpoint.path, "checkpoint.json");
        assert!(config.telemetry.enabled);
        assert_eq!(config.telemetry.address, "0.0.0.0:9090");
    }

    #[test]
    fn checkpoint_key_derived_from_host() {
        let config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(
            config.checkpoint_key(),
            "vpsa/vpsa.example.com/last-forwarded-id"
        );
    }

    #[test]
    fn explicit_checkpoint_key_wins() {
        let yaml = format!(
            "{}\ncheckpoint:\n  key: \"custom/key\"\n",
            minimal_yaml().trim_end()
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.checkpoint_key(), "custom/key");
    }

    #[test]
    fn validation_rejects_empty_host() {
        let yaml = minimal_yaml().replace("vpsa.example.com", "");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptySourceHost)
        ));
    }
}

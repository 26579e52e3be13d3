//! Error types for vpsa-relay using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Source Errors ============

/// Errors that can occur while querying the source API.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// Transport or HTTP failure talking to the source API.
    #[snafu(display("Source API unavailable: {path}"))]
    Unavailable { path: String, source: reqwest::Error },

    /// The response body did not have the expected shape.
    #[snafu(display("Malformed source response for {path}: {message}"))]
    MalformedResponse { path: String, message: String },

    /// The source host could not be combined into a request URL.
    #[snafu(display("Invalid source URL for {path}"))]
    InvalidUrl {
        path: String,
        source: url::ParseError,
    },

    /// The HTTP client could not be constructed.
    #[snafu(display("Failed to build source HTTP client"))]
    ClientBuild { source: reqwest::Error },
}

// ============ Checkpoint Errors ============

/// Errors that can occur reading or writing the checkpoint store.
///
/// Any of these is cycle-fatal: forwarding without checkpoint durability
/// risks silent loss or duplication beyond tolerance.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CheckpointError {
    /// Failed to read the checkpoint value.
    #[snafu(display("Failed to read checkpoint {key}"))]
    Read { key: String, source: std::io::Error },

    /// Failed to persist the checkpoint value.
    #[snafu(display("Failed to persist checkpoint {key}"))]
    Write { key: String, source: std::io::Error },

    /// The checkpoint file contents could not be parsed.
    #[snafu(display("Corrupt checkpoint state at {path}"))]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },

    /// The stored value is not a valid record id.
    #[snafu(display("Checkpoint {key} holds a non-numeric value: {value:?}"))]
    InvalidValue { key: String, value: String },
}

// ============ Metric Sink Errors ============

/// Errors that can occur pushing points to the metric sink.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricSinkError {
    /// Transport failure talking to the metric sink.
    #[snafu(display("Metric sink transport failure"))]
    MetricTransport { source: reqwest::Error },

    /// The sink refused a batch.
    #[snafu(display("Metric sink rejected batch ({status}): {message}"))]
    MetricRejected { status: u16, message: String },

    /// A batch exceeded the sink's point limit.
    #[snafu(display("Metric batch of {count} points exceeds sink limit"))]
    BatchTooLarge { count: usize },
}

// ============ Log Sink Errors ============

/// Errors that can occur appending events to the log sink.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LogSinkError {
    /// Transport failure talking to the log sink.
    #[snafu(display("Log sink transport failure"))]
    LogTransport { source: reqwest::Error },

    /// The supplied append token is stale; the caller may re-resolve and
    /// retry once.
    #[snafu(display("Log sink rejected append: stale token for stream {stream}"))]
    StaleToken { stream: String },

    /// The sink refused an append for any other reason.
    #[snafu(display("Log sink rejected append ({status}): {message}"))]
    LogRejected { status: u16, message: String },

    /// An event payload could not be serialized.
    #[snafu(display("Failed to serialize log event payload"))]
    PayloadSerialize { source: serde_json::Error },
}

impl LogSinkError {
    /// True if the append was refused because the continuation token is stale.
    pub fn is_stale_token(&self) -> bool {
        matches!(self, LogSinkError::StaleToken { .. })
    }
}

// ============ Ship Errors ============

/// Errors that abort a log-shipping run.
///
/// Every variant is cycle-fatal: the checkpoint has not been advanced past
/// the failing batch, so the same records are retried next cycle. Duplicates
/// at the sink are tolerated; lost records are not.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ShipError {
    #[snafu(transparent)]
    ShipFromSource { source: SourceError },

    #[snafu(transparent)]
    ShipCheckpoint { source: CheckpointError },

    #[snafu(transparent)]
    ShipSink { source: LogSinkError },
}

// ============ Forward Errors ============

/// Errors while forwarding one resource's metrics.
///
/// Resource-local: the orchestrator logs the failure, abandons the rest of
/// that resource's batches, and moves on to the next resource.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ForwardError {
    #[snafu(transparent)]
    ForwardSource { source: SourceError },

    #[snafu(transparent)]
    ForwardSink { source: MetricSinkError },
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Source host is empty.
    #[snafu(display("Source host cannot be empty"))]
    EmptySourceHost,

    /// API credential is empty.
    #[snafu(display("Source API key cannot be empty"))]
    EmptyApiKey,

    /// Metric namespace is empty.
    #[snafu(display("Metric namespace cannot be empty"))]
    EmptyNamespace,

    /// Log stream name is empty.
    #[snafu(display("Log stream name cannot be empty"))]
    EmptyLogStream,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Telemetry Errors ============

/// Errors that can occur during internal telemetry initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TelemetryError {
    /// Failed to initialize the Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Cycle Error (top-level) ============

/// Top-level cycle errors that aggregate all error types.
///
/// A `CycleError` reaching `main` produces a non-zero exit for the external
/// scheduler; nothing is swallowed except the two documented tolerances
/// (metric point loss, duplicate log delivery).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CycleError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// The log-shipping phase failed; logs are checkpointed and must not be
    /// skipped silently, so this aborts the whole cycle.
    #[snafu(display("Log shipping failed"))]
    Ship { source: ShipError },

    /// Telemetry initialization error.
    #[snafu(display("Telemetry error"))]
    Telemetry { source: TelemetryError },

    /// Address parsing error for the telemetry endpoint.
    #[snafu(display("Failed to parse telemetry address"))]
    AddressParse { source: std::net::AddrParseError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_token_predicate() {
        let err = LogSinkError::StaleToken {
            stream: "events".to_string(),
        };
        assert!(err.is_stale_token());

        let err = LogSinkError::LogRejected {
            status: 400,
            message: "bad batch".to_string(),
        };
        assert!(!err.is_stale_token());
    }
}

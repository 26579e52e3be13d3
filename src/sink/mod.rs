//! Sink contracts and the data shapes they accept.
//!
//! Two downstream systems: a metrics time-series store and an append-only
//! log-aggregation store. Both are reached through traits so the shipper and
//! forwarder can be exercised against in-memory fakes.

pub mod logs;
pub mod metrics;

pub use logs::HttpLogSink;
pub use metrics::HttpMetricSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LogSinkError, MetricSinkError};

/// Hard sink limit on points per call.
pub const MAX_POINTS_PER_CALL: usize = 10;

/// Unit attached to a forwarded metric point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Milliseconds,
    Megabytes,
    Percent,
    Count,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Milliseconds => "Milliseconds",
            Unit::Megabytes => "Megabytes",
            Unit::Percent => "Percent",
            Unit::Count => "Count",
        }
    }
}

/// One (key, value) pair identifying a metric series.
///
/// Dimensions are an ordered list; keys within one point are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One time-series data point.
#[derive(Debug, Clone, Serialize)]
pub struct MetricPoint {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: Unit,
    pub dimensions: Vec<Dimension>,
}

/// One event ready for the log sink: sink-native epoch-millisecond time and
/// the record payload serialized as self-describing JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: i64,
    pub message: String,
}

/// Opaque continuation value enforcing strict append ordering per stream.
///
/// Returned by every accepted append; must be threaded into the next append
/// to the same stream. Not persisted across cycles: each cycle rediscovers
/// it by asking the sink for the stream's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppendToken(String);

impl AppendToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Metric sink contract: accepts up to [`MAX_POINTS_PER_CALL`] points per
/// call, tagged with the sink's configured namespace.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn put_points(&self, points: &[MetricPoint]) -> Result<(), MetricSinkError>;
}

/// Log sink contract: append-only per-stream event log.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Current continuation token for a stream; `None` when the stream does
    /// not exist yet or has never been appended to.
    async fn resolve_token(&self, stream: &str) -> Result<Option<AppendToken>, LogSinkError>;

    /// Append an ordered batch of events, returning the next token.
    ///
    /// `token` must be the stream's current token, or `None` for a brand-new
    /// stream; a stale token is rejected with [`LogSinkError::StaleToken`].
    async fn append(
        &self,
        stream: &str,
        token: Option<&AppendToken>,
        events: &[LogEvent],
    ) -> Result<AppendToken, LogSinkError>;
}

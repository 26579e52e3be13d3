//! HTTP client for the metric sink.

use async_trait::async_trait;
use serde::Serialize;
use snafu::prelude::*;

use crate::error::{BatchTooLargeSnafu, MetricRejectedSnafu, MetricSinkError, MetricTransportSnafu};
use crate::sink::{Dimension, MetricPoint, MetricSink, MAX_POINTS_PER_CALL};

/// Metric sink client pushing point batches to an HTTP intake endpoint.
pub struct HttpMetricSink {
    http: reqwest::Client,
    put_url: String,
    namespace: String,
}

#[derive(Serialize)]
struct PutPointsRequest<'a> {
    namespace: &'a str,
    points: Vec<WirePoint<'a>>,
}

/// Wire form of a point: sink-native epoch-millisecond timestamp and the
/// unit spelled out as a string.
#[derive(Serialize)]
struct WirePoint<'a> {
    name: &'a str,
    timestamp: i64,
    value: f64,
    unit: &'static str,
    dimensions: &'a [Dimension],
}

impl HttpMetricSink {
    pub fn new(endpoint: &str, namespace: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            put_url: format!("{}/v1/points", endpoint.trim_end_matches('/')),
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl MetricSink for HttpMetricSink {
    async fn put_points(&self, points: &[MetricPoint]) -> Result<(), MetricSinkError> {
        ensure!(
            points.len() <= MAX_POINTS_PER_CALL,
            BatchTooLargeSnafu {
                count: points.len()
            }
        );

        let body = PutPointsRequest {
            namespace: &self.namespace,
            points: points
                .iter()
                .map(|p| WirePoint {
                    name: &p.name,
                    timestamp: p.timestamp.timestamp_millis(),
                    value: p.value,
                    unit: p.unit.as_str(),
                    dimensions: &p.dimensions,
                })
                .collect(),
        };

        let response = self
            .http
            .post(&self.put_url)
            .json(&body)
            .send()
            .await
            .context(MetricTransportSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return MetricRejectedSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        Ok(())
    }
}

//! Metric forwarding: usage samples to sink-sized point batches.
//!
//! Converts raw usage samples into metric points with derived unit and
//! dimension metadata and flushes them in groups the metric sink accepts.
//! Metrics carry no checkpoint: each cycle resends only freshly polled
//! samples, so cross-cycle duplication is structurally impossible and a lost
//! point is an accepted tolerance for point-in-time gauges.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::emit;
use crate::error::MetricSinkError;
use crate::sink::{Dimension, MetricPoint, MetricSink, Unit, MAX_POINTS_PER_CALL};
use crate::source::UsageSample;
use crate::telemetry::events::PointsFlushed;

static PERCENT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(cpu|mem|zcache)_").expect("invalid percent prefix pattern"));

fn ends_with_time(name: &str) -> bool {
    name.ends_with("time")
}

fn ends_with_bandwidth(name: &str) -> bool {
    name.ends_with("bandwidth")
}

fn has_percent_prefix(name: &str) -> bool {
    PERCENT_PREFIX.is_match(name)
}

/// Ordered unit classifier. Evaluated top-down; later rules are not reached
/// if an earlier one matches, and the precedence is part of the contract.
static UNIT_RULES: &[(fn(&str) -> bool, Unit)] = &[
    (ends_with_time, Unit::Milliseconds),
    (ends_with_bandwidth, Unit::Megabytes),
    (has_percent_prefix, Unit::Percent),
];

/// Infer the unit for a metric name. Falls back to a dimensionless count.
pub fn infer_unit(name: &str) -> Unit {
    UNIT_RULES
        .iter()
        .find(|(predicate, _)| predicate(name))
        .map(|(_, unit)| *unit)
        .unwrap_or(Unit::Count)
}

/// Converts usage samples into metric points and flushes them to the sink.
pub struct MetricForwarder<'a> {
    sink: &'a dyn MetricSink,
    /// Source host identity; the base dimension on every point.
    host: String,
}

impl<'a> MetricForwarder<'a> {
    pub fn new(sink: &'a dyn MetricSink, host: impl Into<String>) -> Self {
        Self {
            sink,
            host: host.into(),
        }
    }

    /// Forward the samples of one resource, returning the number of points
    /// flushed.
    ///
    /// A sink rejection propagates immediately: the remaining batches for
    /// this resource are abandoned, the caller decides whether later
    /// resources still run.
    pub async fn forward(
        &self,
        samples: &[UsageSample],
        extra_dimensions: &[Dimension],
    ) -> Result<usize, MetricSinkError> {
        let mut flushed = 0;

        for sample in samples {
            let points = self.points_for_sample(sample, extra_dimensions);
            for batch in points.chunks(MAX_POINTS_PER_CALL) {
                self.sink.put_points(batch).await?;
                flushed += batch.len();
                emit!(PointsFlushed {
                    count: batch.len() as u64
                });
            }
        }

        debug!(points = flushed, "Forwarded resource samples");
        Ok(flushed)
    }

    /// Derive one point per metric name in the sample's values mapping.
    pub fn points_for_sample(
        &self,
        sample: &UsageSample,
        extra_dimensions: &[Dimension],
    ) -> Vec<MetricPoint> {
        let mut dimensions = Vec::with_capacity(1 + extra_dimensions.len());
        dimensions.push(Dimension::new("vpsa", self.host.clone()));
        dimensions.extend(extra_dimensions.iter().cloned());
        debug_assert!(unique_keys(&dimensions), "duplicate dimension key");

        sample
            .values
            .iter()
            .map(|(name, value)| MetricPoint {
                name: name.clone(),
                timestamp: sample.timestamp,
                value: *value,
                unit: infer_unit(name),
                dimensions: dimensions.clone(),
            })
            .collect()
    }
}

fn unique_keys(dimensions: &[Dimension]) -> bool {
    let mut names: Vec<&str> = dimensions.iter().map(|d| d.name.as_str()).collect();
    names.sort_unstable();
    names.windows(2).all(|w| w[0] != w[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[test]
    fn unit_inference_precedence() {
        assert_eq!(infer_unit("read_latency_time"), Unit::Milliseconds);
        assert_eq!(infer_unit("write_bandwidth"), Unit::Megabytes);
        assert_eq!(infer_unit("cpu_busy"), Unit::Percent);
        assert_eq!(infer_unit("mem_used"), Unit::Percent);
        assert_eq!(infer_unit("zcache_hit_rate"), Unit::Percent);
        assert_eq!(infer_unit("iops"), Unit::Count);
    }

    #[test]
    fn time_suffix_beats_percent_prefix() {
        // "cpu_wait_time" matches both the percent prefix and the time
        // suffix; the time rule is evaluated first.
        assert_eq!(infer_unit("cpu_wait_time"), Unit::Milliseconds);
    }

    #[test]
    fn prefix_must_anchor_at_start() {
        assert_eq!(infer_unit("vcpu_busy"), Unit::Count);
    }

    struct NullSink;

    #[async_trait::async_trait]
    impl MetricSink for NullSink {
        async fn put_points(&self, _points: &[MetricPoint]) -> Result<(), MetricSinkError> {
            Ok(())
        }
    }

    #[test]
    fn points_carry_base_and_extra_dimensions() {
        let sink = NullSink;
        let forwarder = MetricForwarder::new(&sink, "vpsa.example.com");

        let mut values = BTreeMap::new();
        values.insert("iops".to_string(), 100.0);
        let sample = UsageSample {
            timestamp: Utc::now(),
            values,
        };

        let points =
            forwarder.points_for_sample(&sample, &[Dimension::new("pool", "pool-00010001")]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].dimensions[0], Dimension::new("vpsa", "vpsa.example.com"));
        assert_eq!(points[0].dimensions[1], Dimension::new("pool", "pool-00010001"));
    }
}

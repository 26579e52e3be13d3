//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the relay.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! Prometheus metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when log records are accepted by the log sink.
pub struct RecordsShipped {
    pub count: u64,
}

impl InternalEvent for RecordsShipped {
    fn emit(self) {
        trace!(count = self.count, "Records shipped");
        counter!("vpsa_relay_records_shipped_total").increment(self.count);
    }
}

/// Event emitted when a log batch append completes.
pub struct LogBatchAppended {
    pub events: usize,
    pub duration: Duration,
}

impl InternalEvent for LogBatchAppended {
    fn emit(self) {
        trace!(
            events = self.events,
            duration_ms = self.duration.as_millis(),
            "Log batch appended"
        );
        counter!("vpsa_relay_log_batches_total").increment(1);
        histogram!("vpsa_relay_log_append_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a stale append token is re-resolved and retried.
pub struct StaleTokenRetried;

impl InternalEvent for StaleTokenRetried {
    fn emit(self) {
        trace!("Stale token retried");
        counter!("vpsa_relay_stale_token_retries_total").increment(1);
    }
}

/// Event emitted when the checkpoint is advanced and persisted.
pub struct CheckpointPersisted {
    pub last_id: u64,
}

impl InternalEvent for CheckpointPersisted {
    fn emit(self) {
        trace!(last_id = self.last_id, "Checkpoint persisted");
        counter!("vpsa_relay_checkpoints_persisted_total").increment(1);
        gauge!("vpsa_relay_last_forwarded_id").set(self.last_id as f64);
    }
}

/// Event emitted when metric points are accepted by the metric sink.
pub struct PointsFlushed {
    pub count: u64,
}

impl InternalEvent for PointsFlushed {
    fn emit(self) {
        trace!(count = self.count, "Points flushed");
        counter!("vpsa_relay_metric_points_total").increment(self.count);
    }
}

/// Event emitted when the metric sink refuses a batch.
pub struct MetricBatchRejected;

impl InternalEvent for MetricBatchRejected {
    fn emit(self) {
        trace!("Metric batch rejected");
        counter!("vpsa_relay_metric_batches_rejected_total").increment(1);
    }
}

/// Outcome of handling one resource during the metric phase.
#[derive(Debug, Clone, Copy)]
pub enum ResourceStatus {
    Processed,
    Skipped,
    Failed,
}

impl ResourceStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Processed => "processed",
            ResourceStatus::Skipped => "skipped",
            ResourceStatus::Failed => "failed",
        }
    }
}

/// Event emitted once per resource handled in the metric phase.
pub struct ResourceHandled {
    pub category: &'static str,
    pub status: ResourceStatus,
}

impl InternalEvent for ResourceHandled {
    fn emit(self) {
        trace!(
            category = self.category,
            status = self.status.as_str(),
            "Resource handled"
        );
        counter!(
            "vpsa_relay_resources_total",
            "category" => self.category,
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a forwarding cycle completes.
pub struct CycleCompleted {
    pub duration: Duration,
}

impl InternalEvent for CycleCompleted {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "Cycle completed");
        histogram!("vpsa_relay_cycle_duration_seconds").record(self.duration.as_secs_f64());
    }
}

//! Log shipping with checkpointed resume.
//!
//! Drives pagination of the appliance message log from the checkpoint store,
//! partitions records into time-bounded batches the log sink accepts, and
//! advances the checkpoint only after a batch is durably accepted. Crash
//! semantics are at-least-once per batch boundary: a re-run may deliver a
//! batch twice, it can never lose a record.

use chrono::{DateTime, TimeDelta, Utc};
use snafu::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::emit;
use crate::error::{InvalidValueSnafu, PayloadSerializeSnafu, ShipError};
use crate::sink::{AppendToken, LogEvent, LogSink};
use crate::source::{LogRecord, SourceApi};
use crate::telemetry::events::{
    CheckpointPersisted, LogBatchAppended, RecordsShipped, StaleTokenRetried,
};

/// Hard sink limit on the `occurred_at` span of one batch.
fn max_batch_span() -> TimeDelta {
    TimeDelta::hours(24)
}

/// The append token for the current cycle.
///
/// Resolved lazily from the sink on first use; `Resolved(None)` means the
/// stream does not exist yet and appends proceed with no token.
enum CycleToken {
    Unresolved,
    Resolved(Option<AppendToken>),
}

/// Ships appliance log records to the log sink, resuming from the
/// checkpoint.
pub struct LogShipper<'a> {
    source: &'a dyn SourceApi,
    sink: &'a dyn LogSink,
    store: &'a dyn CheckpointStore,
    stream: String,
    checkpoint_key: String,
    page_size: usize,
}

impl<'a> LogShipper<'a> {
    pub fn new(
        source: &'a dyn SourceApi,
        sink: &'a dyn LogSink,
        store: &'a dyn CheckpointStore,
        stream: impl Into<String>,
        checkpoint_key: impl Into<String>,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            sink,
            store,
            stream: stream.into(),
            checkpoint_key: checkpoint_key.into(),
            page_size,
        }
    }

    /// Ship all log records newer than the checkpoint, returning how many
    /// were forwarded.
    pub async fn ship(&self) -> Result<usize, ShipError> {
        let mut last_forwarded_id = self.read_checkpoint().await?;
        let mut token = CycleToken::Unresolved;
        let mut shipped = 0usize;

        info!(
            checkpoint = last_forwarded_id,
            stream = %self.stream,
            "Shipping log records"
        );

        loop {
            let page = self
                .source
                .fetch_log(last_forwarded_id, self.page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            debug!(records = page.len(), after = last_forwarded_id, "Fetched log page");

            // Pending records never carry over a page boundary: each batch
            // is flushed and checkpointed before the next page is fetched.
            for batch in partition_by_span(&page, max_batch_span()) {
                self.append_batch(&mut token, batch).await?;

                // The page is ascending by id, so the batch's last record
                // holds its maximum id.
                let batch_last_id = batch.last().map(|r| r.id).unwrap_or(last_forwarded_id);
                self.store
                    .set(&self.checkpoint_key, &batch_last_id.to_string())
                    .await?;
                last_forwarded_id = batch_last_id;
                shipped += batch.len();

                emit!(RecordsShipped {
                    count: batch.len() as u64
                });
                emit!(CheckpointPersisted {
                    last_id: batch_last_id
                });
            }
        }

        info!(records = shipped, "Log shipping complete");
        Ok(shipped)
    }

    async fn read_checkpoint(&self) -> Result<u64, ShipError> {
        match self.store.get(&self.checkpoint_key).await? {
            // Never shipped from this source before.
            None => Ok(0),
            Some(value) => {
                let id = value.parse().ok().context(InvalidValueSnafu {
                    key: self.checkpoint_key.clone(),
                    value,
                })?;
                Ok(id)
            }
        }
    }

    /// Append one batch, retrying a stale-token rejection exactly once after
    /// re-resolving the token from the sink.
    async fn append_batch(
        &self,
        token: &mut CycleToken,
        batch: &[LogRecord],
    ) -> Result<(), ShipError> {
        let events = build_events(batch)?;

        if matches!(token, CycleToken::Unresolved) {
            *token = CycleToken::Resolved(self.sink.resolve_token(&self.stream).await?);
        }

        let started = Instant::now();
        let current = match token {
            CycleToken::Resolved(t) => t.as_ref(),
            CycleToken::Unresolved => unreachable!("token resolved above"),
        };

        let next = match self.sink.append(&self.stream, current, &events).await {
            Ok(next) => next,
            Err(e) if e.is_stale_token() => {
                warn!(stream = %self.stream, "Append token stale, re-resolving");
                emit!(StaleTokenRetried);
                let refreshed = self.sink.resolve_token(&self.stream).await?;
                self.sink
                    .append(&self.stream, refreshed.as_ref(), &events)
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        emit!(LogBatchAppended {
            events: events.len(),
            duration: started.elapsed(),
        });

        *token = CycleToken::Resolved(Some(next));
        Ok(())
    }
}

/// Partition a page of records into contiguous batches whose `occurred_at`
/// span stays under `max_span`.
///
/// A batch closes as soon as the next record would stretch it to `max_span`
/// or beyond. The bound is tracked against the minimum and maximum timestamp
/// seen so far, so out-of-order timestamps within the page cannot widen a
/// closed batch.
fn partition_by_span(records: &[LogRecord], max_span: TimeDelta) -> Vec<&[LogRecord]> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut bounds: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

    for (index, record) in records.iter().enumerate() {
        let (min, max) = match bounds {
            None => (record.occurred_at, record.occurred_at),
            Some((min, max)) => (min.min(record.occurred_at), max.max(record.occurred_at)),
        };

        if max - min >= max_span {
            batches.push(&records[start..index]);
            start = index;
            bounds = Some((record.occurred_at, record.occurred_at));
        } else {
            bounds = Some((min, max));
        }
    }

    if start < records.len() {
        batches.push(&records[start..]);
    }
    batches
}

/// Build sink events for a batch: payloads serialized as JSON, timestamps in
/// sink-native epoch milliseconds, sorted ascending by `occurred_at` (the
/// sink's ordering requirement is independent of source id ordering).
fn build_events(batch: &[LogRecord]) -> Result<Vec<LogEvent>, ShipError> {
    let mut ordered: Vec<&LogRecord> = batch.iter().collect();
    ordered.sort_by_key(|r| r.occurred_at);

    ordered
        .into_iter()
        .map(|record| {
            let message =
                serde_json::to_string(&record.payload).context(PayloadSerializeSnafu)?;
            Ok(LogEvent {
                timestamp: record.occurred_at.timestamp_millis(),
                message,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: u64, occurred_at: DateTime<Utc>) -> LogRecord {
        LogRecord {
            id,
            occurred_at,
            payload: json!({"id": id}),
        }
    }

    fn at(hours: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + hours * 3600, 0).unwrap()
    }

    #[test]
    fn single_page_within_span_is_one_batch() {
        let records = vec![record(1, at(0)), record(2, at(1)), record(3, at(23))];
        let batches = partition_by_span(&records, max_batch_span());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }

    #[test]
    fn batch_closes_before_span_reaches_limit() {
        // The third record lands exactly 24h after the first; the span must
        // stay strictly under the limit, so it opens a new batch.
        let records = vec![record(1, at(0)), record(2, at(12)), record(3, at(24))];
        let batches = partition_by_span(&records, max_batch_span());
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn out_of_order_timestamps_cannot_widen_a_batch() {
        // Ids ascend but occurred_at does not; the span check uses min/max.
        let records = vec![record(1, at(10)), record(2, at(0)), record(3, at(25))];
        let batches = partition_by_span(&records, max_batch_span());
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn every_record_lands_in_exactly_one_batch() {
        let records: Vec<_> = (0..10).map(|i| record(i, at(i as i64 * 7))).collect();
        let batches = partition_by_span(&records, max_batch_span());
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, records.len());
        for batch in &batches {
            let min = batch.iter().map(|r| r.occurred_at).min().unwrap();
            let max = batch.iter().map(|r| r.occurred_at).max().unwrap();
            assert!(max - min < max_batch_span());
        }
    }

    #[test]
    fn events_are_sorted_by_occurred_at() {
        let records = vec![record(1, at(3)), record(2, at(1)), record(3, at(2))];
        let events = build_events(&records).unwrap();
        let times: Vec<_> = events.iter().map(|e| e.timestamp).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }

    #[test]
    fn event_message_is_the_payload_as_json() {
        let records = vec![record(7, at(0))];
        let events = build_events(&records).unwrap();
        assert_eq!(events[0].message, r#"{"id":7}"#);
        assert_eq!(events[0].timestamp, at(0).timestamp_millis());
    }
}

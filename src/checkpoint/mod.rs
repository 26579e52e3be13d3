//! Checkpoint store for resumable log shipping.
//!
//! The checkpoint is a single scalar per source identity: the id of the last
//! log record durably accepted by the log sink. It is read once at the start
//! of a shipping cycle and persisted again after each accepted batch, so a
//! mid-cycle crash loses at most one in-flight batch's progress.

mod file;

pub use file::FileCheckpointStore;

use async_trait::async_trait;

use crate::error::CheckpointError;

/// Durable single-value store keyed by source identity.
///
/// `get` returns `None` when the key has never been set; the shipper treats
/// that as "start from the beginning".
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the stored value for a key, `None` if never set.
    async fn get(&self, key: &str) -> Result<Option<String>, CheckpointError>;

    /// Durably persist a value for a key.
    async fn set(&self, key: &str, value: &str) -> Result<(), CheckpointError>;
}

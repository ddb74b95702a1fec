//! Read-only memory status for operators.

use crate::core_types::ThreadKey;
use crate::errors::StoreError;
use crate::memory::{CheckpointLookup, CheckpointStore, StoreBackend};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStatus {
    pub thread_id: String,
    pub has_memory: bool,
    pub message_count: usize,
    pub checkpoint_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
    pub storage: StoreBackend,
}

pub async fn memory_status(
    store: &dyn CheckpointStore,
    thread_key: &ThreadKey,
) -> Result<MemoryStatus, StoreError> {
    let latest = store.get_latest(thread_key).await?;
    let versions = store.list_versions(thread_key).await?;

    let (message_count, last_activity) = match latest {
        CheckpointLookup::Found(checkpoint) => {
            (checkpoint.state.message_count(), Some(checkpoint.created_at))
        }
        CheckpointLookup::NotFound => (0, None),
    };

    Ok(MemoryStatus {
        thread_id: thread_key.to_string(),
        has_memory: last_activity.is_some(),
        message_count,
        checkpoint_count: versions.len(),
        last_activity,
        storage: store.backend(),
    })
}

//! Checkpoint model and the storage contract.
//!
//! A checkpoint is an immutable snapshot of a thread taken after a turn. Stores
//! only ever add versions; nothing is updated in place. Version numbers start
//! at 1 and grow by one per append for a given thread key.
//!
//! Stores do not detect concurrent writers on one key. Callers serialise turns
//! per thread (see `orchestrator::ThreadLocks`).

use crate::core_types::{Message, ThreadKey};
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything persisted for a thread: the message log plus auxiliary channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    pub messages: Vec<Message>,
    /// Rolling summary produced by the `llm` summary strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Number of leading messages folded into `summary`.
    #[serde(default)]
    pub summarized_through: usize,
}

impl ThreadState {
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_key: ThreadKey,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub state: ThreadState,
}

impl Checkpoint {
    pub fn meta(&self) -> CheckpointMeta {
        CheckpointMeta {
            thread_key: self.thread_key.clone(),
            version: self.version,
            created_at: self.created_at,
            message_count: self.state.message_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub thread_key: ThreadKey,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Result of [`CheckpointStore::get_latest`]. A missing thread is an ordinary
/// outcome (its first turn), not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointLookup {
    Found(Checkpoint),
    NotFound,
}

impl CheckpointLookup {
    pub fn into_option(self) -> Option<Checkpoint> {
        match self {
            CheckpointLookup::Found(checkpoint) => Some(checkpoint),
            CheckpointLookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, CheckpointLookup::Found(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Relational storage shared across processes and restarts.
    Durable,
    /// Process-local storage chosen at startup.
    Volatile,
    /// The durable backend failed at runtime and a process-local store took over.
    Degraded,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Durable => "durable",
            StoreBackend::Volatile => "volatile",
            StoreBackend::Degraded => "degraded",
        }
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Most recent checkpoint for `thread_key`.
    async fn get_latest(&self, thread_key: &ThreadKey) -> Result<CheckpointLookup, StoreError>;

    /// Commits `state` as the next version. All-or-nothing: on error no new
    /// version is visible.
    async fn append(&self, thread_key: &ThreadKey, state: ThreadState)
        -> Result<Checkpoint, StoreError>;

    /// Metadata of every version for `thread_key`, newest first.
    async fn list_versions(&self, thread_key: &ThreadKey)
        -> Result<Vec<CheckpointMeta>, StoreError>;

    fn backend(&self) -> StoreBackend;
}

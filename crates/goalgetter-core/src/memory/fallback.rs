//! Store selection and degraded mode.
//!
//! The durable backend is wrapped so that the first `Unavailable` error moves
//! the whole process onto a local volatile store for the rest of its lifetime.
//! The failed operation is retried there, so the request in flight still
//! succeeds.

use crate::config::StorageConfig;
use crate::core_types::ThreadKey;
use crate::errors::StoreError;
use crate::memory::checkpoint::{
    Checkpoint, CheckpointLookup, CheckpointMeta, CheckpointStore, StoreBackend, ThreadState,
};
use crate::memory::sql::{redact_url, SqlCheckpointStore};
use crate::memory::volatile::InMemoryCheckpointStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct FallbackCheckpointStore {
    primary: Arc<dyn CheckpointStore>,
    fallback: InMemoryCheckpointStore,
    degraded: AtomicBool,
}

impl FallbackCheckpointStore {
    pub fn new(primary: Arc<dyn CheckpointStore>) -> Self {
        Self {
            primary,
            fallback: InMemoryCheckpointStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Returns true if the error switched the store into degraded mode.
    fn degrade_on(&self, operation: &str, err: &StoreError) -> bool {
        if !err.is_unavailable() {
            return false;
        }
        if !self.degraded.swap(true, Ordering::SeqCst) {
            log::warn!(
                "Durable checkpoint store unavailable during {}: {}. \
                 Switching to in-process storage until restart; history will not be shared or persisted",
                operation,
                err
            );
        }
        true
    }
}

#[async_trait]
impl CheckpointStore for FallbackCheckpointStore {
    async fn get_latest(&self, thread_key: &ThreadKey) -> Result<CheckpointLookup, StoreError> {
        if self.is_degraded() {
            return self.fallback.get_latest(thread_key).await;
        }
        match self.primary.get_latest(thread_key).await {
            Err(e) if self.degrade_on("get_latest", &e) => {
                self.fallback.get_latest(thread_key).await
            }
            other => other,
        }
    }

    async fn append(
        &self,
        thread_key: &ThreadKey,
        state: ThreadState,
    ) -> Result<Checkpoint, StoreError> {
        if self.is_degraded() {
            return self.fallback.append(thread_key, state).await;
        }
        match self.primary.append(thread_key, state.clone()).await {
            Err(e) if self.degrade_on("append", &e) => self.fallback.append(thread_key, state).await,
            other => other,
        }
    }

    async fn list_versions(
        &self,
        thread_key: &ThreadKey,
    ) -> Result<Vec<CheckpointMeta>, StoreError> {
        if self.is_degraded() {
            return self.fallback.list_versions(thread_key).await;
        }
        match self.primary.list_versions(thread_key).await {
            Err(e) if self.degrade_on("list_versions", &e) => {
                self.fallback.list_versions(thread_key).await
            }
            other => other,
        }
    }

    fn backend(&self) -> StoreBackend {
        if self.is_degraded() {
            StoreBackend::Degraded
        } else {
            self.primary.backend()
        }
    }
}

/// Builds the checkpoint store described by `config`.
///
/// Never fails: a missing URL or an unreachable database yields the volatile
/// store with a warning.
pub async fn open_checkpoint_store(config: &StorageConfig) -> Arc<dyn CheckpointStore> {
    let url = match config.database_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url,
        _ => {
            log::warn!("No database URL configured; conversation memory is process-local");
            return Arc::new(InMemoryCheckpointStore::new());
        }
    };

    match SqlCheckpointStore::connect(url, config).await {
        Ok(store) => Arc::new(FallbackCheckpointStore::new(Arc::new(store))),
        Err(e) => {
            log::warn!(
                "Could not open checkpoint database {}: {}. Falling back to process-local memory",
                redact_url(url),
                e
            );
            Arc::new(InMemoryCheckpointStore::new())
        }
    }
}

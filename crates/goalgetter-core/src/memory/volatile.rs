//! Process-local checkpoint store.
//!
//! Used when no database is configured and as the takeover store once the
//! durable backend becomes unreachable. Contents are lost on restart.

use crate::core_types::ThreadKey;
use crate::errors::StoreError;
use crate::memory::checkpoint::{
    Checkpoint, CheckpointLookup, CheckpointMeta, CheckpointStore, StoreBackend, ThreadState,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    threads: RwLock<HashMap<ThreadKey, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get_latest(&self, thread_key: &ThreadKey) -> Result<CheckpointLookup, StoreError> {
        let threads = self.threads.read().await;
        Ok(threads
            .get(thread_key)
            .and_then(|versions| versions.last())
            .cloned()
            .map_or(CheckpointLookup::NotFound, CheckpointLookup::Found))
    }

    async fn append(
        &self,
        thread_key: &ThreadKey,
        state: ThreadState,
    ) -> Result<Checkpoint, StoreError> {
        let mut threads = self.threads.write().await;
        let versions = threads.entry(thread_key.clone()).or_default();
        let checkpoint = Checkpoint {
            thread_key: thread_key.clone(),
            version: versions.last().map_or(1, |c| c.version + 1),
            created_at: Utc::now(),
            state,
        };
        versions.push(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn list_versions(
        &self,
        thread_key: &ThreadKey,
    ) -> Result<Vec<CheckpointMeta>, StoreError> {
        let threads = self.threads.read().await;
        Ok(threads
            .get(thread_key)
            .map(|versions| versions.iter().rev().map(Checkpoint::meta).collect())
            .unwrap_or_default())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Volatile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Message;

    fn state(texts: &[&str]) -> ThreadState {
        ThreadState {
            messages: texts.iter().map(|t| Message::user(*t)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_thread_is_not_found() {
        let store = InMemoryCheckpointStore::new();
        let key = ThreadKey::for_user("1").unwrap();
        assert_eq!(store.get_latest(&key).await.unwrap(), CheckpointLookup::NotFound);
        assert!(store.list_versions(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_increments_versions_and_lists_newest_first() {
        let store = InMemoryCheckpointStore::new();
        let key = ThreadKey::for_user("1").unwrap();

        let first = store.append(&key, state(&["a"])).await.unwrap();
        let second = store.append(&key, state(&["a", "b"])).await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);

        let latest = store.get_latest(&key).await.unwrap().into_option().unwrap();
        assert_eq!(latest, second);

        let versions = store.list_versions(&key).await.unwrap();
        assert_eq!(
            versions.iter().map(|m| m.version).collect::<Vec<_>>(),
            vec![2, 1]
        );
        assert_eq!(versions[0].message_count, 2);
        assert_eq!(store.backend(), StoreBackend::Volatile);
    }

    #[tokio::test]
    async fn test_threads_are_independent() {
        let store = InMemoryCheckpointStore::new();
        let a = ThreadKey::for_user("a").unwrap();
        let b = ThreadKey::for_user("b").unwrap();

        store.append(&a, state(&["from a"])).await.unwrap();
        store.append(&a, state(&["from a", "again"])).await.unwrap();
        let b_first = store.append(&b, state(&["from b"])).await.unwrap();

        assert_eq!(b_first.version, 1);
        assert_eq!(store.thread_count().await, 2);
        let b_latest = store.get_latest(&b).await.unwrap().into_option().unwrap();
        assert_eq!(b_latest.state.messages.len(), 1);
    }
}

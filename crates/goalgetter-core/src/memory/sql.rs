//! Relational checkpoint store.
//!
//! Runs on PostgreSQL in production and on SQLite locally, through the sqlx
//! `Any` driver. One row per checkpoint version; the thread state is stored as
//! JSON text and timestamps as RFC 3339 strings so both databases share a
//! schema.

use crate::config::StorageConfig;
use crate::core_types::ThreadKey;
use crate::errors::StoreError;
use crate::memory::checkpoint::{
    Checkpoint, CheckpointLookup, CheckpointMeta, CheckpointStore, StoreBackend, ThreadState,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use std::time::Duration;

pub const DEFAULT_TABLE: &str = "goalgetter_checkpoints";

pub struct SqlCheckpointStore {
    pool: AnyPool,
    table: String,
}

impl SqlCheckpointStore {
    pub fn new(pool: AnyPool) -> Self {
        Self {
            pool,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    pub fn with_table(pool: AnyPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    /// Opens a pool for `url` and makes sure the checkpoint table exists.
    pub async fn connect(url: &str, config: &StorageConfig) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(url)
            .await?;

        let store = Self::new(pool);
        store.ensure_table().await?;
        log::info!("Connected checkpoint store ({})", redact_url(url));
        Ok(store)
    }

    /// Ensure the checkpoint table exists (idempotent).
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                thread_key    TEXT NOT NULL,
                version       BIGINT NOT NULL,
                message_count BIGINT NOT NULL,
                state         TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                PRIMARY KEY (thread_key, version)
            )",
            self.table
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn decode_checkpoint(thread_key: &ThreadKey, row: &AnyRow) -> Result<Checkpoint, StoreError> {
        let version: i64 = row.try_get("version")?;
        let state: String = row.try_get("state")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(Checkpoint {
            thread_key: thread_key.clone(),
            version: to_version(version)?,
            created_at: parse_timestamp(&created_at)?,
            state: serde_json::from_str(&state)?,
        })
    }
}

#[async_trait]
impl CheckpointStore for SqlCheckpointStore {
    async fn get_latest(&self, thread_key: &ThreadKey) -> Result<CheckpointLookup, StoreError> {
        let sql = format!(
            "SELECT version, state, created_at FROM {} WHERE thread_key = $1 ORDER BY version DESC LIMIT 1",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(thread_key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(CheckpointLookup::Found(Self::decode_checkpoint(
                thread_key, &row,
            )?)),
            None => Ok(CheckpointLookup::NotFound),
        }
    }

    async fn append(
        &self,
        thread_key: &ThreadKey,
        state: ThreadState,
    ) -> Result<Checkpoint, StoreError> {
        let payload = serde_json::to_string(&state)?;
        let created_at = Utc::now();

        let mut tx = self.pool.begin().await?;

        let latest_sql = format!(
            "SELECT version FROM {} WHERE thread_key = $1 ORDER BY version DESC LIMIT 1",
            self.table
        );
        let previous: Option<i64> = sqlx::query(&latest_sql)
            .bind(thread_key.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.try_get::<i64, _>("version"))
            .transpose()?;
        let version = previous.unwrap_or(0) + 1;

        let insert_sql = format!(
            "INSERT INTO {} (thread_key, version, message_count, state, created_at) VALUES ($1, $2, $3, $4, $5)",
            self.table
        );
        sqlx::query(&insert_sql)
            .bind(thread_key.as_str())
            .bind(version)
            .bind(state.message_count() as i64)
            .bind(payload)
            .bind(created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Checkpoint {
            thread_key: thread_key.clone(),
            version: to_version(version)?,
            created_at,
            state,
        })
    }

    async fn list_versions(
        &self,
        thread_key: &ThreadKey,
    ) -> Result<Vec<CheckpointMeta>, StoreError> {
        let sql = format!(
            "SELECT version, message_count, created_at FROM {} WHERE thread_key = $1 ORDER BY version DESC",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(thread_key.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<CheckpointMeta, StoreError> {
                let version: i64 = row.try_get("version")?;
                let message_count: i64 = row.try_get("message_count")?;
                let created_at: String = row.try_get("created_at")?;
                Ok(CheckpointMeta {
                    thread_key: thread_key.clone(),
                    version: to_version(version)?,
                    created_at: parse_timestamp(&created_at)?,
                    message_count: usize::try_from(message_count).map_err(|_| {
                        StoreError::Serialization(format!(
                            "negative message count {} in checkpoint row",
                            message_count
                        ))
                    })?,
                })
            })
            .collect()
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Durable
    }
}

fn to_version(raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw)
        .map_err(|_| StoreError::Serialization(format!("invalid checkpoint version {}", raw)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("invalid timestamp '{}': {}", raw, e)))
}

/// Strips credentials from a connection URL before it is logged.
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

//! Checkpoint persistence for resumable runs

pub mod cleanup;
pub mod manager;
#[cfg(feature = "sqlite")]
pub mod store;

pub use cleanup::{CheckpointCleanupTask, DEFAULT_CLEANUP_INTERVAL};
pub use manager::{new_run_id, CheckpointManager, DEFAULT_CHECKPOINT_TTL_MS};
#[cfg(feature = "sqlite")]
pub use store::SqliteCheckpointStore;

pub use crate::core::CheckpointStatus;
use crate::core::PipelineContext;
use crate::pause::PendingPause;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A persisted snapshot of run progress at one step boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub run_id: String,
    pub pipeline_id: String,

    /// Index of the step this row was written for
    pub step: usize,

    pub status: CheckpointStatus,

    /// Context as it was when the row was written
    pub context: PipelineContext,

    /// Set on rows written for a pause
    pub pause: Option<PendingPause>,

    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(
        run_id: impl Into<String>,
        step: usize,
        status: CheckpointStatus,
        context: PipelineContext,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            pipeline_id: context.pipeline_id.clone(),
            step,
            status,
            context,
            pause: None,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_pause(mut self, pause: PendingPause) -> Self {
        self.pause = Some(pause);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Storage contract for checkpoint rows
///
/// Rows are keyed by `(run_id, step)`. Saving a row for an existing key
/// supersedes it. Implementations must keep runs isolated by `run_id`.
#[async_trait::async_trait]
pub trait CheckpointStorage: Send + Sync {
    /// Insert or supersede the row for `(record.run_id, record.step)`
    async fn save(&self, record: &CheckpointRecord) -> Result<()>;

    /// The row with the greatest step index for a run
    async fn get_latest(&self, run_id: &str) -> Result<Option<CheckpointRecord>>;

    async fn get(&self, run_id: &str, step: usize) -> Result<Option<CheckpointRecord>>;

    /// Update the status of the run's latest row
    async fn update_status(&self, run_id: &str, status: CheckpointStatus) -> Result<()>;

    async fn delete_run(&self, run_id: &str) -> Result<()>;

    /// Remove rows whose expiry has passed, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;

    async fn close(&self) -> Result<()>;
}

/// In-memory checkpoint storage (for testing or ephemeral use)
pub struct InMemoryCheckpointStore {
    rows: tokio::sync::RwLock<BTreeMap<(String, usize), CheckpointRecord>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            rows: tokio::sync::RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of rows currently stored
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn run_range(run_id: &str) -> std::ops::RangeInclusive<(String, usize)> {
        (run_id.to_string(), 0)..=(run_id.to_string(), usize::MAX)
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CheckpointStorage for InMemoryCheckpointStore {
    async fn save(&self, record: &CheckpointRecord) -> Result<()> {
        let mut rows = self.rows.write().await;
        let key = (record.run_id.clone(), record.step);
        let mut record = record.clone();
        if let Some(existing) = rows.get(&key) {
            record.created_at = existing.created_at;
        }
        rows.insert(key, record);
        Ok(())
    }

    async fn get_latest(&self, run_id: &str) -> Result<Option<CheckpointRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .range(Self::run_range(run_id))
            .next_back()
            .map(|(_, record)| record.clone()))
    }

    async fn get(&self, run_id: &str, step: usize) -> Result<Option<CheckpointRecord>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(run_id.to_string(), step)).cloned())
    }

    async fn update_status(&self, run_id: &str, status: CheckpointStatus) -> Result<()> {
        let mut rows = self.rows.write().await;
        if let Some((_, record)) = rows.range_mut(Self::run_range(run_id)).next_back() {
            record.status = status;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_run(&self, run_id: &str) -> Result<()> {
        let mut rows = self.rows.write().await;
        rows.retain(|(id, _), _| id != run_id);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, record| !record.is_expired_at(now));
        Ok((before - rows.len()) as u64)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

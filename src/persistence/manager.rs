//! Checkpoint manager - run ids, TTLs and storage passthroughs

use crate::core::CheckpointStatus;
use crate::pause::{expiry_after, ttl_from_millis};
use crate::persistence::{CheckpointRecord, CheckpointStorage};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Process-wide checkpoint TTL when nothing else is configured (24 hours)
pub const DEFAULT_CHECKPOINT_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Generate a globally unique run id
pub fn new_run_id() -> String {
    format!("run_{}", Uuid::new_v4().simple())
}

/// Front door to checkpoint storage used by the executor
pub struct CheckpointManager {
    storage: Arc<dyn CheckpointStorage>,
    default_ttl: Duration,
}

impl CheckpointManager {
    pub fn new(storage: Arc<dyn CheckpointStorage>) -> Self {
        Self {
            storage,
            default_ttl: ttl_from_millis(DEFAULT_CHECKPOINT_TTL_MS),
        }
    }

    /// Override the process-wide default TTL
    pub fn with_default_ttl(mut self, default_ttl: Duration) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn storage(&self) -> Arc<dyn CheckpointStorage> {
        self.storage.clone()
    }

    pub fn generate_run_id(&self) -> String {
        new_run_id()
    }

    /// Combine a per-pipeline TTL override with the default
    pub fn resolve_ttl(&self, pipeline_ttl_ms: Option<u64>) -> Duration {
        pipeline_ttl_ms.map(ttl_from_millis).unwrap_or(self.default_ttl)
    }

    /// Expiry for a row written now
    pub fn expires_at(&self, pipeline_ttl_ms: Option<u64>) -> DateTime<Utc> {
        expiry_after(Utc::now(), self.resolve_ttl(pipeline_ttl_ms))
    }

    pub async fn save_checkpoint(&self, record: &CheckpointRecord) -> Result<()> {
        debug!(
            run_id = %record.run_id,
            step = record.step,
            status = %record.status,
            "Saving checkpoint"
        );
        self.storage.save(record).await
    }

    pub async fn get_latest_checkpoint(&self, run_id: &str) -> Result<Option<CheckpointRecord>> {
        self.storage.get_latest(run_id).await
    }

    pub async fn get_checkpoint(&self, run_id: &str, step: usize) -> Result<Option<CheckpointRecord>> {
        self.storage.get(run_id, step).await
    }

    pub async fn update_status(&self, run_id: &str, status: CheckpointStatus) -> Result<()> {
        debug!(run_id = %run_id, status = %status, "Updating checkpoint status");
        self.storage.update_status(run_id, status).await
    }

    /// Give every row of `run_id` below `before_step` the expiry `expires_at`
    ///
    /// A paused run's rows must expire together: once the paused row is swept,
    /// an older row must not become the latest one.
    pub async fn align_expiry(&self, run_id: &str, before_step: usize, expires_at: DateTime<Utc>) -> Result<()> {
        let mut aligned = 0;
        for step in 0..before_step {
            let Some(mut record) = self.storage.get(run_id, step).await? else {
                continue;
            };
            if record.expires_at != expires_at {
                record.expires_at = expires_at;
                self.storage.save(&record).await?;
                aligned += 1;
            }
        }
        debug!(run_id = %run_id, aligned, expires_at = %expires_at, "Aligned checkpoint expiry");
        Ok(())
    }

    pub async fn delete_run(&self, run_id: &str) -> Result<()> {
        self.storage.delete_run(run_id).await
    }

    pub async fn close(&self) -> Result<()> {
        self.storage.close().await
    }
}

impl std::fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointManager")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

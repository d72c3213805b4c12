//! SQLite-based checkpoint store

use crate::core::config::default_database_path;
use crate::core::{CheckpointStatus, PipelineContext};
use crate::pause::PendingPause;
use crate::persistence::{CheckpointRecord, CheckpointStorage};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

const SELECT_COLUMNS: &str = "run_id, pipeline_id, step, status, context, pause, expires_at, created_at, updated_at";

/// SQLite checkpoint store
///
/// Timestamps are stored as epoch milliseconds so expiry sweeps are a plain
/// integer comparison. Context and pause payloads are stored as JSON text.
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Open (creating if missing) the database at `db_path`
    pub async fn new(db_path: &str) -> Result<Self> {
        let in_memory = db_path == ":memory:";
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);

        // Each in-memory connection is its own database
        let max_connections = if in_memory { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(":memory:").await
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        Self::open(&default_database_path()).await
    }

    /// Open a store at a filesystem path, creating parent directories
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let path = path
            .to_str()
            .with_context(|| format!("Database path is not valid UTF-8: {}", path.display()))?;
        Self::new(path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                run_id TEXT NOT NULL,
                pipeline_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                status TEXT NOT NULL,
                context TEXT NOT NULL,
                pause TEXT,
                expires_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (run_id, step)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create checkpoints table")?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_checkpoints_expires_at ON checkpoints(expires_at)",
            "CREATE INDEX IF NOT EXISTS idx_checkpoints_status ON checkpoints(status)",
        ] {
            sqlx::query(index)
                .execute(&self.pool)
                .await
                .context("Failed to create checkpoint index")?;
        }

        Ok(())
    }

    fn to_millis(dt: DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
        DateTime::from_timestamp_millis(ms).with_context(|| format!("Timestamp out of range: {}", ms))
    }

    fn from_row(row: &SqliteRow) -> Result<CheckpointRecord> {
        let context: PipelineContext = serde_json::from_str(&row.try_get::<String, _>("context")?)
            .context("Failed to decode checkpoint context")?;
        let pause: Option<PendingPause> = row
            .try_get::<Option<String>, _>("pause")?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .context("Failed to decode pending pause")?;
        let step = usize::try_from(row.try_get::<i64, _>("step")?).context("Negative step index")?;

        Ok(CheckpointRecord {
            run_id: row.try_get("run_id")?,
            pipeline_id: row.try_get("pipeline_id")?,
            step,
            status: row.try_get::<String, _>("status")?.parse()?,
            context,
            pause,
            expires_at: Self::from_millis(row.try_get("expires_at")?)?,
            created_at: Self::from_millis(row.try_get("created_at")?)?,
            updated_at: Self::from_millis(row.try_get("updated_at")?)?,
        })
    }
}

#[async_trait::async_trait]
impl CheckpointStorage for SqliteCheckpointStore {
    async fn save(&self, record: &CheckpointRecord) -> Result<()> {
        let context = serde_json::to_string(&record.context).context("Failed to encode context")?;
        let pause = record
            .pause
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode pending pause")?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints
            (run_id, pipeline_id, step, status, context, pause, expires_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(run_id, step) DO UPDATE SET
                pipeline_id = excluded.pipeline_id,
                status = excluded.status,
                context = excluded.context,
                pause = excluded.pause,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.run_id)
        .bind(&record.pipeline_id)
        .bind(i64::try_from(record.step).context("Step index too large")?)
        .bind(record.status.as_str())
        .bind(context)
        .bind(pause)
        .bind(Self::to_millis(record.expires_at))
        .bind(Self::to_millis(record.created_at))
        .bind(Self::to_millis(record.updated_at))
        .execute(&self.pool)
        .await
        .context("Failed to save checkpoint")?;

        Ok(())
    }

    async fn get_latest(&self, run_id: &str) -> Result<Option<CheckpointRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM checkpoints WHERE run_id = ?1 ORDER BY step DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load latest checkpoint")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn get(&self, run_id: &str, step: usize) -> Result<Option<CheckpointRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM checkpoints WHERE run_id = ?1 AND step = ?2",
            SELECT_COLUMNS
        ))
        .bind(run_id)
        .bind(i64::try_from(step).context("Step index too large")?)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load checkpoint")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn update_status(&self, run_id: &str, status: CheckpointStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE checkpoints
            SET status = ?1, updated_at = ?2
            WHERE run_id = ?3
              AND step = (SELECT MAX(step) FROM checkpoints WHERE run_id = ?3)
            "#,
        )
        .bind(status.as_str())
        .bind(Self::to_millis(Utc::now()))
        .bind(run_id)
        .execute(&self.pool)
        .await
        .context("Failed to update checkpoint status")?;

        Ok(())
    }

    async fn delete_run(&self, run_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE run_id = ?1")
            .bind(run_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete run checkpoints")?;

        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE expires_at <= ?1")
            .bind(Self::to_millis(Utc::now()))
            .execute(&self.pool)
            .await
            .context("Failed to delete expired checkpoints")?;

        Ok(result.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

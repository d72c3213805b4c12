//! Engine error types
//!
//! Expected domain outcomes (pauses, handoff denials, step failures) travel in
//! [`crate::execution::PipelineResult`]; these errors cover calls that cannot
//! produce a result at all.

use crate::agent::AgentError;
use crate::core::CheckpointStatus;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for executor entry points
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Pipeline not registered: {0}")]
    PipelineNotRegistered(String),

    #[error("No checkpoint manager configured; runs cannot be resumed")]
    CheckpointsUnavailable,

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Run {run_id} is not paused (status: {status})")]
    NotPaused {
        run_id: String,
        status: CheckpointStatus,
    },

    #[error("Pause for run {run_id} expired at {expired_at}")]
    PauseExpired {
        run_id: String,
        expired_at: DateTime<Utc>,
    },

    #[error("Checkpoint storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// A step's own execution failed; fatal to the run
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0:#}")]
    Function(anyhow::Error),

    #[error("Agent '{agent}' failed: {source}")]
    Agent {
        agent: String,
        #[source]
        source: AgentError,
    },

    #[error("Agent not registered: {0}")]
    AgentNotRegistered(String),
}

impl EngineError {
    pub fn invalid_pipeline<S: Into<String>>(message: S) -> Self {
        Self::InvalidPipeline(message.into())
    }

    /// Check if this is a resume attempt past the pause's expiry
    pub fn is_expired(&self) -> bool {
        matches!(self, EngineError::PauseExpired { .. })
    }
}

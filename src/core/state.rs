//! Run status models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status recorded on a checkpoint row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// A step is about to run or running
    InProgress,
    /// Waiting for human input
    Paused,
    /// Every step finished
    Completed,
    /// A step raised an error
    Failed,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::InProgress => "in_progress",
            CheckpointStatus::Paused => "paused",
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Failed => "failed",
        }
    }

    /// Check if the run can no longer make progress from this row
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckpointStatus::Completed | CheckpointStatus::Failed)
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(CheckpointStatus::InProgress),
            "paused" => Ok(CheckpointStatus::Paused),
            "completed" => Ok(CheckpointStatus::Completed),
            "failed" => Ok(CheckpointStatus::Failed),
            other => anyhow::bail!("Unknown checkpoint status: {}", other),
        }
    }
}

//! Pending pauses awaiting human input

use crate::error::EngineError;
use crate::pause::signal::{PauseMetadata, ResumeBehavior};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a pause was raised inside a run
#[derive(Debug, Clone, Copy)]
pub struct PausePoint<'a> {
    pub run_id: &'a str,
    pub pipeline_id: &'a str,
    pub step_name: &'a str,
    pub step_index: usize,
    /// Agent that was active when the pause was raised
    pub active_agent: Option<&'a str>,
}

/// A run suspended at a step boundary until a human answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPause {
    pub run_id: String,
    pub pipeline_id: String,
    pub step_name: String,
    pub step_index: usize,
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    #[serde(default)]
    pub resume_behavior: ResumeBehavior,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent: Option<String>,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingPause {
    /// Materialize a detected pause
    ///
    /// The signal's own `ttlMs` wins over `default_ttl`.
    pub fn materialize(
        signal: &PauseMetadata,
        point: PausePoint<'_>,
        default_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let ttl = signal.ttl_ms.map(ttl_from_millis).unwrap_or(default_ttl);
        Self {
            run_id: point.run_id.to_string(),
            pipeline_id: point.pipeline_id.to_string(),
            step_name: point.step_name.to_string(),
            step_index: point.step_index,
            prompt: signal.prompt.clone(),
            choices: signal.choices.clone(),
            schema: signal.schema.clone(),
            metadata: signal.metadata.clone(),
            resume_behavior: signal.resume_behavior,
            active_agent: point.active_agent.map(str::to_string),
            created_at: now,
            expires_at: expiry_after(now, ttl),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Fail with [`EngineError::PauseExpired`] once the pause has lapsed
    pub fn ensure_resumable(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.is_expired_at(now) {
            return Err(EngineError::PauseExpired {
                run_id: self.run_id.clone(),
                expired_at: self.expires_at,
            });
        }
        Ok(())
    }
}

/// `now + ttl`, clamped to the latest representable instant
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Convert a millisecond TTL, saturating instead of overflowing
pub fn ttl_from_millis(ttl_ms: u64) -> Duration {
    Duration::try_milliseconds(i64::try_from(ttl_ms).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX)
}

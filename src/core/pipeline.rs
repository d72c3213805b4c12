//! Pipeline domain model

use crate::core::step::Step;
use crate::error::EngineError;
use crate::handoff::HandoffConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per-pipeline checkpoint settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSettings {
    /// Write a checkpoint at every step boundary
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Overrides the manager's default TTL (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: None,
        }
    }
}

impl CheckpointSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ttl_ms: None,
        }
    }

    pub fn with_ttl_ms(ttl_ms: u64) -> Self {
        Self {
            enabled: true,
            ttl_ms: Some(ttl_ms),
        }
    }
}

/// A pipeline definition: an ordered list of uniquely named steps
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub id: String,
    pub steps: Vec<Step>,

    /// `None` means checkpoint whenever a manager is available
    pub checkpoint: Option<CheckpointSettings>,

    /// Delegation rules, one per source agent
    pub handoffs: Vec<HandoffConfig>,
}

impl PipelineConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
            checkpoint: None,
            handoffs: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_checkpoint(mut self, settings: CheckpointSettings) -> Self {
        self.checkpoint = Some(settings);
        self
    }

    pub fn with_handoff(mut self, config: HandoffConfig) -> Self {
        self.handoffs.push(config);
        self
    }

    /// Whether checkpoints should be written when a manager is supplied
    pub fn checkpoints_enabled(&self) -> bool {
        self.checkpoint.map(|c| c.enabled).unwrap_or(true)
    }

    pub fn checkpoint_ttl_ms(&self) -> Option<u64> {
        self.checkpoint.and_then(|c| c.ttl_ms)
    }

    /// Declared handoff rules for a source agent
    pub fn handoff_config(&self, source_agent: &str) -> Option<&HandoffConfig> {
        self.handoffs.iter().find(|h| h.source_agent == source_agent)
    }

    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Validate the pipeline definition
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::invalid_pipeline("Pipeline id must not be empty"));
        }
        if self.steps.is_empty() {
            return Err(EngineError::invalid_pipeline(format!(
                "Pipeline '{}' has no steps",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(EngineError::invalid_pipeline(format!(
                    "Pipeline '{}' has a step with an empty name",
                    self.id
                )));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(EngineError::invalid_pipeline(format!(
                    "Duplicate step name: {}",
                    step.name
                )));
            }
        }

        for handoff in &self.handoffs {
            if handoff.source_agent.trim().is_empty() {
                return Err(EngineError::invalid_pipeline(
                    "Handoff config has an empty source agent",
                ));
            }
        }

        Ok(())
    }
}

//! Engine-wide handoff policy

use crate::handoff::HandoffConfig;
use std::collections::HashMap;

/// Default cap on the number of handoffs in one run
pub const DEFAULT_MAX_HANDOFF_DEPTH: usize = 5;

/// Handoff rules owned by an executor
///
/// Pipeline-declared configs take precedence over the fallback `agents` map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffPolicy {
    /// Maximum length of a run's handoff chain
    pub max_depth: usize,

    /// Fallback configs keyed by source agent
    pub agents: HashMap<String, HandoffConfig>,
}

impl HandoffPolicy {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            agents: HashMap::new(),
        }
    }

    pub fn with_agent(mut self, config: HandoffConfig) -> Self {
        self.agents.insert(config.source_agent.clone(), config);
        self
    }

    /// Fallback config for a source agent
    pub fn config_for(&self, source_agent: &str) -> Option<&HandoffConfig> {
        self.agents.get(source_agent)
    }

    /// Error message when a chain of `depth` handoffs may not grow further
    pub fn check_depth(&self, depth: usize) -> Result<(), String> {
        if depth >= self.max_depth {
            Err(format!("Handoff depth limit of {} exceeded", self.max_depth))
        } else {
            Ok(())
        }
    }
}

impl Default for HandoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HANDOFF_DEPTH)
    }
}

//! Agent capability consumed by agent steps

pub mod response;

use crate::core::context::{HistoryMessage, PipelineContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub use response::{AgentError, AgentResponse, ToolCallRecord};

/// Trait for agent execution - allows for different implementations
///
/// The returned value may be a plain payload, a handoff request, or an
/// agent response whose tool-call results embed a pause signal.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn process_message(&self, input: &Value, context: &AgentContext) -> Result<Value, AgentError>;
}

/// The view of a run an agent is given
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub input: Value,
    pub history: Vec<HistoryMessage>,
    pub outputs: Map<String, Value>,
    pub metadata: Map<String, Value>,
}

impl From<&PipelineContext> for AgentContext {
    fn from(context: &PipelineContext) -> Self {
        Self {
            input: context.input.clone(),
            history: context.history.clone(),
            outputs: context.outputs.clone(),
            metadata: context.metadata.clone(),
        }
    }
}

/// Agents addressable by name
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any agent with the same name
    pub fn register(&mut self, name: impl Into<String>, agent: Arc<dyn Agent>) {
        self.agents.insert(name.into(), agent);
    }

    pub fn with_agent(mut self, name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        self.register(name, agent);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

//! Pipeline context - the state threaded through every step of a run

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key holding the list of handoffs performed during a run
pub const HANDOFF_CHAIN_KEY: &str = "handoffChain";

/// Metadata key holding the most recent human input supplied on resume
pub const HUMAN_INPUT_KEY: &str = "humanInput";

/// Execution context for a pipeline run
///
/// Outputs are insertion-ordered and keys are never removed. Steps receive a
/// shared reference; the executor is the only writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineContext {
    /// Id of the pipeline this run belongs to
    pub pipeline_id: String,

    /// Input the run was started with
    pub input: Value,

    /// Outputs of completed steps (step name -> result)
    #[serde(default)]
    pub outputs: Map<String, Value>,

    /// Prior conversation messages
    #[serde(default)]
    pub history: Vec<HistoryMessage>,

    /// Open key/value bag shared by all steps
    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// A message in the run's conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Who produced the message (user, assistant, agent name, ...)
    pub role: String,

    /// Message text
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl HistoryMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            name: None,
        }
    }

    /// Build a user message from an arbitrary JSON value
    pub fn user(value: &Value) -> Self {
        let content = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self::new("user", content)
    }
}

impl PipelineContext {
    /// Create a fresh context for a run
    pub fn new(pipeline_id: impl Into<String>, input: Value) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            input,
            outputs: Map::new(),
            history: Vec::new(),
            metadata: Map::new(),
            conversation_id: None,
            run_id: None,
        }
    }

    /// Record the output of a step
    pub fn record_output(&mut self, step_name: &str, output: Value) {
        self.outputs.insert(step_name.to_string(), output);
    }

    /// Get the output of a step
    pub fn output(&self, step_name: &str) -> Option<&Value> {
        self.outputs.get(step_name)
    }

    /// Append a message to the history
    pub fn push_history(&mut self, message: HistoryMessage) {
        self.history.push(message);
    }

    pub fn set_metadata(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Number of handoffs already performed in this run
    pub fn handoff_depth(&self) -> usize {
        self.metadata
            .get(HANDOFF_CHAIN_KEY)
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Carry outputs, history and metadata over from a restored context
    pub fn merge_restored(&mut self, restored: &PipelineContext) {
        for (name, output) in &restored.outputs {
            self.outputs.insert(name.clone(), output.clone());
        }
        self.history.extend(restored.history.iter().cloned());
        for (key, value) in &restored.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
    }
}

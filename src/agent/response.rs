//! Agent response types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error types for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Tool error: {0}")]
    Tool(#[from] crate::tools::ToolError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A tool invocation made while an agent produced its response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,

    #[serde(default)]
    pub arguments: Value,

    /// What the tool returned
    #[serde(default)]
    pub result: Value,
}

/// Response from the agent
///
/// Serializes to the agent-response wire shape (`content` + `toolCalls`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    /// The response content
    pub content: String,

    /// Tool calls made while producing the content
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl AgentResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_call(mut self, name: impl Into<String>, arguments: Value, result: Value) -> Self {
        self.tool_calls.push(ToolCallRecord {
            name: name.into(),
            arguments,
            result,
        });
        self
    }

    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

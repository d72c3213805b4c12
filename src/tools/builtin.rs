//! Built-in tools for pausing and delegation

use crate::handoff::{validate_handoff_target, HandoffConfig, HandoffRequest};
use crate::pause::PauseMetadata;
use crate::tools::{Tool, ToolError};
use async_trait::async_trait;
use serde_json::Value;

pub const HUMAN_INPUT_TOOL_NAME: &str = "request_human_input";
pub const HANDOFF_TOOL_NAME: &str = "handoff";

/// Asks the run to pause for a human answer
///
/// Arguments use the pause payload fields (`prompt`, `choices`, `schema`,
/// `metadata`, `resumeBehavior`, `ttlMs`). The result is the tool pause shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct HumanInputTool;

#[async_trait]
impl Tool for HumanInputTool {
    fn name(&self) -> &str {
        HUMAN_INPUT_TOOL_NAME
    }

    async fn execute(&self, arguments: &Value) -> Result<Value, ToolError> {
        let metadata: PauseMetadata = serde_json::from_value(arguments.clone())
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if metadata.prompt.trim().is_empty() {
            return Err(ToolError::InvalidArguments("prompt must not be empty".to_string()));
        }
        Ok(metadata.to_tool_value())
    }
}

/// Delegates the current step to another agent
///
/// Validates `targetAgent` against the owning agent's whitelist and returns
/// the handoff result. A denial is a normal result the agent can react to.
#[derive(Debug, Clone)]
pub struct HandoffTool {
    config: HandoffConfig,
}

impl HandoffTool {
    pub fn new(config: HandoffConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &str {
        HANDOFF_TOOL_NAME
    }

    async fn execute(&self, arguments: &Value) -> Result<Value, ToolError> {
        let request: HandoffRequest = serde_json::from_value(arguments.clone())
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        Ok(validate_handoff_target(&request, &self.config).to_value())
    }
}

//! Agent-to-agent handoff: whitelist validation and context preparation
//!
//! A handoff lets the agent running a step delegate the rest of that step to
//! another agent. Delegation is only allowed towards targets the source
//! agent's [`HandoffConfig`] lists. Denials are values, not errors: the
//! denied step records a `handoff_error` payload as its output so the
//! initiating agent can react to it.

pub mod policy;

pub use policy::{HandoffPolicy, DEFAULT_MAX_HANDOFF_DEPTH};

use crate::agent::AgentContext;
use crate::core::context::{PipelineContext, HANDOFF_CHAIN_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

/// Metadata key naming the agent that handed off
pub const HANDOFF_FROM_KEY: &str = "handoffFrom";
/// Metadata key holding the handoff depth at the time of the handoff
pub const HANDOFF_DEPTH_KEY: &str = "handoffDepth";
/// Metadata key holding the reason given for the handoff
pub const HANDOFF_REASON_KEY: &str = "handoffReason";

/// Wire marker for a handoff request
const HANDOFF_MARKER: &str = "__handoff";

/// Delegation rules for one source agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Agent these rules apply to
    pub source_agent: String,

    /// Agents the source may delegate to (exact, case-sensitive names)
    #[serde(default)]
    pub allowed_targets: Vec<String>,

    /// Whether the target sees the conversation history
    #[serde(default = "default_preserve_history")]
    pub preserve_history: bool,
}

fn default_preserve_history() -> bool {
    true
}

impl HandoffConfig {
    pub fn new(source_agent: impl Into<String>, allowed_targets: Vec<String>) -> Self {
        Self {
            source_agent: source_agent.into(),
            allowed_targets,
            preserve_history: true,
        }
    }

    /// Rules that refuse every target
    pub fn deny_all(source_agent: impl Into<String>) -> Self {
        Self::new(source_agent, Vec::new())
    }

    pub fn with_preserve_history(mut self, preserve_history: bool) -> Self {
        self.preserve_history = preserve_history;
        self
    }
}

/// A request from an agent to hand the current step to another agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRequest {
    pub target_agent: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl HandoffRequest {
    pub fn new(target_agent: impl Into<String>) -> Self {
        Self {
            target_agent: target_agent.into(),
            reason: None,
            metadata: Map::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Wire form an agent returns to request a handoff
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "__handoff": true,
            "targetAgent": self.target_agent,
        });
        if let Some(reason) = &self.reason {
            value["reason"] = json!(reason);
        }
        if !self.metadata.is_empty() {
            value["metadata"] = Value::Object(self.metadata.clone());
        }
        value
    }

    /// Parse the `{__handoff: true, targetAgent, ...}` wire form
    pub fn from_wire(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.get(HANDOFF_MARKER) != Some(&Value::Bool(true)) {
            return None;
        }
        let target_agent = obj.get("targetAgent")?.as_str()?.to_string();
        Some(Self {
            target_agent,
            reason: obj.get("reason").and_then(Value::as_str).map(str::to_string),
            metadata: obj
                .get("metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        })
    }
}

/// Outcome of validating a handoff request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffResult {
    Accepted { target_agent: String },
    Denied { target_agent: String, error: String },
}

impl HandoffResult {
    pub fn success(&self) -> bool {
        matches!(self, HandoffResult::Accepted { .. })
    }

    pub fn target_agent(&self) -> &str {
        match self {
            HandoffResult::Accepted { target_agent } | HandoffResult::Denied { target_agent, .. } => {
                target_agent
            }
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            HandoffResult::Accepted { .. } => None,
            HandoffResult::Denied { error, .. } => Some(error),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            HandoffResult::Accepted { target_agent } => json!({
                "type": "handoff",
                "targetAgent": target_agent,
                "success": true,
            }),
            HandoffResult::Denied { target_agent, error } => json!({
                "type": "handoff",
                "targetAgent": target_agent,
                "success": false,
                "error": error,
            }),
        }
    }

    /// Parse a value that passes [`is_handoff_result`]
    pub fn from_value(value: &Value) -> Option<Self> {
        if !is_handoff_result(value) {
            return None;
        }
        let target_agent = value["targetAgent"].as_str()?.to_string();
        if value["success"] == Value::Bool(true) {
            Some(HandoffResult::Accepted { target_agent })
        } else {
            let error = value["error"].as_str()?.to_string();
            Some(HandoffResult::Denied { target_agent, error })
        }
    }
}

/// Check whether a value has the exact handoff result shape
pub fn is_handoff_result(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if obj.get("type").and_then(Value::as_str) != Some("handoff") {
        return false;
    }
    if !obj.get("targetAgent").is_some_and(Value::is_string) {
        return false;
    }
    match obj.get("success") {
        Some(Value::Bool(true)) => true,
        Some(Value::Bool(false)) => obj.get("error").is_some_and(Value::is_string),
        _ => false,
    }
}

/// Check a handoff request against the source agent's whitelist
///
/// Every validation emits an audit event through `tracing`.
pub fn validate_handoff_target(request: &HandoffRequest, config: &HandoffConfig) -> HandoffResult {
    let allowed = config
        .allowed_targets
        .iter()
        .any(|target| target == &request.target_agent);

    if allowed {
        info!(
            target: "waypoint::audit",
            source_agent = %config.source_agent,
            target_agent = %request.target_agent,
            reason = request.reason.as_deref().unwrap_or(""),
            "Handoff allowed"
        );
        HandoffResult::Accepted {
            target_agent: request.target_agent.clone(),
        }
    } else {
        let error = format!(
            "Handoff to '{}' not allowed. Available: {}",
            request.target_agent,
            config.allowed_targets.join(", ")
        );
        warn!(
            target: "waypoint::audit",
            source_agent = %config.source_agent,
            target_agent = %request.target_agent,
            "{}",
            error
        );
        HandoffResult::Denied {
            target_agent: request.target_agent.clone(),
            error,
        }
    }
}

/// Build the context the target agent receives
pub fn prepare_handoff_context(
    request: &HandoffRequest,
    context: &PipelineContext,
    config: &HandoffConfig,
) -> AgentContext {
    let mut metadata = context.metadata.clone();
    metadata.insert(HANDOFF_FROM_KEY.to_string(), json!(config.source_agent));
    metadata.insert(HANDOFF_DEPTH_KEY.to_string(), json!(context.handoff_depth()));
    if let Some(reason) = &request.reason {
        metadata.insert(HANDOFF_REASON_KEY.to_string(), json!(reason));
    }
    for (key, value) in &request.metadata {
        metadata.insert(key.clone(), value.clone());
    }

    AgentContext {
        input: context.input.clone(),
        history: if config.preserve_history {
            context.history.clone()
        } else {
            Vec::new()
        },
        outputs: context.outputs.clone(),
        metadata,
    }
}

/// Output recorded for a step whose handoff was refused
pub fn handoff_error_output(error: &str, available_targets: &[String]) -> Value {
    json!({
        "type": "handoff_error",
        "error": error,
        "availableTargets": available_targets,
    })
}

/// One delegation recorded in `metadata.handoffChain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffChainEntry {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Append a handoff to the context's chain
pub fn append_handoff_chain(context: &mut PipelineContext, entry: HandoffChainEntry) {
    let entry = serde_json::to_value(entry).unwrap_or(Value::Null);
    match context.metadata.get_mut(HANDOFF_CHAIN_KEY) {
        Some(Value::Array(chain)) => chain.push(entry),
        _ => {
            context
                .metadata
                .insert(HANDOFF_CHAIN_KEY.to_string(), Value::Array(vec![entry]));
        }
    }
}

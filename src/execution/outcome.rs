//! Classification of step results
//!
//! Every shape check the executor relies on lives here. Pause conventions are
//! checked before handoff requests, and anything unrecognized is plain output.

use crate::handoff::{HandoffRequest, HandoffResult};
use crate::pause::{detect_pause_signal, PauseMetadata, PauseSignalKind};
use serde_json::{Map, Value};

/// What a step result asks the executor to do
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A tool pause, returned directly or embedded in an agent's tool calls
    ToolPause(PauseMetadata),
    /// A function step's `{pause: true}` request
    RequestPause(PauseMetadata),
    /// Delegate the step to another agent
    Handoff(HandoffRequest),
    /// Record the value as the step's output
    Plain,
}

impl StepOutcome {
    pub fn is_pause(&self) -> bool {
        matches!(self, StepOutcome::ToolPause(_) | StepOutcome::RequestPause(_))
    }
}

/// Classify a step result
pub fn classify_step_result(result: &Value) -> StepOutcome {
    if let Some(signal) = detect_pause_signal(result) {
        return match signal.kind {
            PauseSignalKind::Request => StepOutcome::RequestPause(signal.metadata),
            PauseSignalKind::Tool | PauseSignalKind::Embedded { .. } => {
                StepOutcome::ToolPause(signal.metadata)
            }
        };
    }

    match detect_handoff_request(result) {
        Some(request) => StepOutcome::Handoff(request),
        None => StepOutcome::Plain,
    }
}

fn detect_handoff_request(result: &Value) -> Option<HandoffRequest> {
    if let Some(request) = HandoffRequest::from_wire(result) {
        return Some(request);
    }

    let tool_calls = result.get("toolCalls")?.as_array()?;
    tool_calls.iter().find_map(|call| {
        let embedded = call.get("result")?;
        if let Some(request) = HandoffRequest::from_wire(embedded) {
            return Some(request);
        }

        // Denied results were already shown to the agent
        match HandoffResult::from_value(embedded)? {
            HandoffResult::Accepted { target_agent } => {
                Some(request_from_arguments(target_agent, call.get("arguments")))
            }
            HandoffResult::Denied { .. } => None,
        }
    })
}

/// Recover reason and metadata from the handoff tool's arguments
fn request_from_arguments(target_agent: String, arguments: Option<&Value>) -> HandoffRequest {
    let mut request = HandoffRequest::new(target_agent);
    if let Some(reason) = arguments.and_then(|a| a.get("reason")).and_then(Value::as_str) {
        request = request.with_reason(reason);
    }
    if let Some(metadata) = arguments
        .and_then(|a| a.get("metadata"))
        .and_then(Value::as_object)
    {
        request = request.with_metadata(Map::clone(metadata));
    }
    request
}

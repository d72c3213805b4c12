//! Pause signal wire conventions and detection
//!
//! Two conventions carry the same payload:
//! - tools emit `{__pause: true, prompt, ...}`
//! - function steps return `{pause: true, prompt, ...}`
//!
//! Agent responses may also embed a tool pause in `toolCalls[i].result`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const TOOL_MARKER: &str = "__pause";
const REQUEST_MARKER: &str = "pause";

/// What happens to the paused step when the run resumes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeBehavior {
    /// Inject the human input and run the paused step again
    Rerun,
    /// Accept the paused step as finished and move to the next step
    #[default]
    Continue,
}

impl ResumeBehavior {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rerun" => Some(ResumeBehavior::Rerun),
            "continue" => Some(ResumeBehavior::Continue),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeBehavior::Rerun => "rerun",
            ResumeBehavior::Continue => "continue",
        }
    }
}

/// Normalized pause payload shared by both conventions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseMetadata {
    /// Question shown to the human
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,

    /// JSON schema the human input should satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    #[serde(default)]
    pub resume_behavior: ResumeBehavior,

    /// Overrides the pipeline/process TTL for this pause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

impl PauseMetadata {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            choices: None,
            schema: None,
            metadata: None,
            resume_behavior: ResumeBehavior::Continue,
            ttl_ms: None,
        }
    }

    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_resume_behavior(mut self, resume_behavior: ResumeBehavior) -> Self {
        self.resume_behavior = resume_behavior;
        self
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    /// The `{pause: true, ...}` form a function step returns
    pub fn to_request_value(&self) -> Value {
        self.to_marked_value(REQUEST_MARKER)
    }

    /// The `{__pause: true, ...}` form a tool emits
    pub fn to_tool_value(&self) -> Value {
        self.to_marked_value(TOOL_MARKER)
    }

    fn to_marked_value(&self, marker: &str) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Value::Object(obj) = &mut value {
            obj.insert(marker.to_string(), Value::Bool(true));
        }
        value
    }

    /// Parse an object carrying `marker: true` and a string `prompt`
    fn from_marked(value: &Value, marker: &str) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.get(marker) != Some(&Value::Bool(true)) {
            return None;
        }
        let prompt = obj.get("prompt")?.as_str()?.to_string();

        Some(Self {
            prompt,
            choices: obj.get("choices").and_then(Value::as_array).map(|choices| {
                choices
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            }),
            schema: obj.get("schema").filter(|v| !v.is_null()).cloned(),
            metadata: obj.get("metadata").and_then(Value::as_object).cloned(),
            resume_behavior: obj
                .get("resumeBehavior")
                .and_then(Value::as_str)
                .and_then(ResumeBehavior::parse)
                .unwrap_or_default(),
            ttl_ms: obj.get("ttlMs").and_then(Value::as_u64),
        })
    }
}

/// Which convention a detected pause arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseSignalKind {
    /// Tool-emitted `__pause` object returned directly
    Tool,
    /// Function-step `pause` object
    Request,
    /// Tool pause found inside an agent response's tool calls
    Embedded { tool_index: usize },
}

/// A detected pause
#[derive(Debug, Clone, PartialEq)]
pub struct PauseSignal {
    pub kind: PauseSignalKind,
    pub metadata: PauseMetadata,
}

/// Classify a step result as a pause, trying each convention in order
pub fn detect_pause_signal(result: &Value) -> Option<PauseSignal> {
    if let Some(metadata) = PauseMetadata::from_marked(result, TOOL_MARKER) {
        return Some(PauseSignal {
            kind: PauseSignalKind::Tool,
            metadata,
        });
    }

    if let Some(metadata) = PauseMetadata::from_marked(result, REQUEST_MARKER) {
        return Some(PauseSignal {
            kind: PauseSignalKind::Request,
            metadata,
        });
    }

    let tool_calls = result.get("toolCalls")?.as_array()?;
    tool_calls.iter().enumerate().find_map(|(tool_index, call)| {
        let embedded = call.get("result")?;
        PauseMetadata::from_marked(embedded, TOOL_MARKER).map(|metadata| PauseSignal {
            kind: PauseSignalKind::Embedded { tool_index },
            metadata,
        })
    })
}

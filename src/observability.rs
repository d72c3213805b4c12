//! Structured event sink and logging setup
//!
//! The executor reports handoff validations, pauses and run completion to an
//! optional [`ObservabilitySink`]. Events are delivered on a spawned task so a
//! slow or failing sink never delays or fails a run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Severity of a structured event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One structured event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredLog {
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StructuredLog {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            metadata: Map::new(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Destination for structured events
#[async_trait]
pub trait ObservabilitySink: Send + Sync {
    async fn log_structured(&self, event: StructuredLog) -> anyhow::Result<()>;
}

/// Sink forwarding events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl ObservabilitySink for TracingSink {
    async fn log_structured(&self, event: StructuredLog) -> anyhow::Result<()> {
        let metadata = Value::Object(event.metadata);
        match event.level {
            LogLevel::Debug => tracing::debug!(target: "waypoint::events", %metadata, "{}", event.message),
            LogLevel::Info => tracing::info!(target: "waypoint::events", %metadata, "{}", event.message),
            LogLevel::Warn => tracing::warn!(target: "waypoint::events", %metadata, "{}", event.message),
            LogLevel::Error => tracing::error!(target: "waypoint::events", %metadata, "{}", event.message),
        }
        Ok(())
    }
}

/// Deliver an event without waiting for the sink
///
/// Requires a tokio runtime. Sink failures are logged at debug level.
pub fn emit(sink: Option<&Arc<dyn ObservabilitySink>>, event: StructuredLog) {
    let Some(sink) = sink.cloned() else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = sink.log_structured(event).await {
            tracing::debug!(error = %e, "Observability sink rejected event");
        }
    });
}

/// Initialize the global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

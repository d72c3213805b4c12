//! waypoint - durable, pausable pipeline orchestration for LLM agent workflows
//!
//! A [`PipelineExecutor`] drives a sequence of function and agent steps over a
//! shared [`PipelineContext`]. Runs checkpoint at every step boundary, can
//! pause for human input and resume later (even in another process), and let
//! agents delegate a step to whitelisted peers.

pub mod agent;
pub mod cli;
pub mod core;
pub mod error;
pub mod execution;
pub mod handoff;
pub mod observability;
pub mod pause;
pub mod persistence;
pub mod tools;

// Re-export commonly used types
pub use agent::{Agent, AgentContext, AgentError, AgentRegistry, AgentResponse};
pub use core::{
    CheckpointSettings, CheckpointStatus, EngineConfig, FunctionRegistry, PipelineConfig, PipelineContext,
    PipelineManifest, Step,
};
pub use error::{EngineError, StepError};
pub use execution::{ExecuteOptions, PipelineExecutor, PipelineResult, ResumeOptions, RunOutcome};
pub use handoff::{HandoffConfig, HandoffPolicy, HandoffRequest, HandoffResult};
pub use observability::{ObservabilitySink, StructuredLog, TracingSink};
pub use pause::{PauseMetadata, PendingPause, ResumeBehavior};
pub use persistence::{
    CheckpointCleanupTask, CheckpointManager, CheckpointRecord, CheckpointStorage, InMemoryCheckpointStore,
};
#[cfg(feature = "sqlite")]
pub use persistence::SqliteCheckpointStore;

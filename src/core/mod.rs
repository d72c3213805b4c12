//! Core domain models
//!
//! This module defines the fundamental data structures that represent
//! pipelines, steps, run context and checkpoint status.

pub mod config;
pub mod context;
pub mod pipeline;
pub mod state;
pub mod step;

pub use config::{EngineConfig, FunctionRegistry, PipelineManifest, StepManifest};
pub use context::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;

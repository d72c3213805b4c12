//! Pipeline execution engine

pub mod executor;
pub mod outcome;

pub use executor::{ExecuteOptions, PipelineExecutor, PipelineResult, ResumeOptions, RunOutcome};
pub use outcome::{classify_step_result, StepOutcome};

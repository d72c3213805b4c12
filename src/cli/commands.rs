//! CLI command definitions

use clap::Args;

/// Validate a pipeline manifest
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show the latest checkpoint of a run
#[derive(Debug, Args, Clone)]
pub struct InspectCommand {
    /// Run id (as returned by the executor)
    pub run_id: String,

    /// Include the full context snapshot
    #[arg(long)]
    pub context: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Delete every checkpoint of a run
#[derive(Debug, Args, Clone)]
pub struct PurgeCommand {
    /// Run id to delete
    pub run_id: String,
}

/// Delete expired checkpoints
#[derive(Debug, Args, Clone)]
pub struct CleanupCommand {
    /// Keep sweeping on the configured interval until interrupted
    #[arg(long)]
    pub watch: bool,

    /// Sweep interval in seconds (overrides the engine configuration)
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

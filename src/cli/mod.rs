//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{CleanupCommand, InspectCommand, PurgeCommand, ValidateCommand};
use std::ffi::OsString;

/// Inspect and maintain durable pipeline runs
#[derive(Debug, Parser, Clone)]
#[command(name = "waypoint")]
#[command(version)]
#[command(about = "Checkpoint maintenance and pipeline validation for waypoint runs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to engine configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Checkpoint database file (overrides the engine configuration)
    #[arg(long, global = true)]
    pub database: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate a pipeline manifest
    Validate(ValidateCommand),

    /// Show the latest checkpoint of a run
    Inspect(InspectCommand),

    /// Delete every checkpoint of a run
    Purge(PurgeCommand),

    /// Delete expired checkpoints
    Cleanup(CleanupCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

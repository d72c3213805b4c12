use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use waypoint::cli::commands::{CleanupCommand, InspectCommand, PurgeCommand, ValidateCommand};
use waypoint::cli::output::*;
use waypoint::cli::{Cli, Command};
use waypoint::core::{EngineConfig, PipelineManifest};
use waypoint::observability;
use waypoint::persistence::{CheckpointCleanupTask, CheckpointManager, CheckpointStorage, SqliteCheckpointStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    observability::init_logging(log_level);

    let engine = load_engine_config(&cli)?;

    // Execute command
    match &cli.command {
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Inspect(cmd) => inspect_run(cmd, &cli, &engine).await?,
        Command::Purge(cmd) => purge_run(cmd, &cli, &engine).await?,
        Command::Cleanup(cmd) => cleanup(cmd, &cli, &engine).await?,
    }

    Ok(())
}

fn load_engine_config(cli: &Cli) -> Result<EngineConfig> {
    match &cli.config {
        Some(path) => EngineConfig::from_file(path).context("Failed to load engine config"),
        None => Ok(EngineConfig::default()),
    }
}

async fn open_store(cli: &Cli, engine: &EngineConfig) -> Result<Arc<SqliteCheckpointStore>> {
    let path = cli
        .database
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| engine.database_path());
    info!(path = %path.display(), "Opening checkpoint database");
    let store = SqliteCheckpointStore::open(&path)
        .await
        .with_context(|| format!("Failed to open checkpoint database at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineManifest::from_file(&cmd.file) {
        Ok(manifest) => {
            println!("{} Pipeline manifest is valid!", CHECK);
            for line in format_manifest(&manifest) {
                println!("{}", line);
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&manifest)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn inspect_run(cmd: &InspectCommand, cli: &Cli, engine: &EngineConfig) -> Result<()> {
    let store = open_store(cli, engine).await?;
    let manager = CheckpointManager::new(store).with_default_ttl(engine.default_ttl());

    let Some(record) = manager.get_latest_checkpoint(&cmd.run_id).await? else {
        println!("{} Run not found: {}", WARN, style(&cmd.run_id).bold());
        manager.close().await?;
        std::process::exit(1);
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{} Latest checkpoint", INFO);
        for line in format_checkpoint(&record, Utc::now()) {
            println!("{}", line);
        }

        if cmd.context {
            println!("\n  {}", style("Context:").bold());
            let json = serde_json::to_string_pretty(&record.context)?;
            for line in json.lines() {
                println!("    {}", line);
            }
        }
    }

    manager.close().await
}

async fn purge_run(cmd: &PurgeCommand, cli: &Cli, engine: &EngineConfig) -> Result<()> {
    let store = open_store(cli, engine).await?;
    let manager = CheckpointManager::new(store);

    if manager.get_latest_checkpoint(&cmd.run_id).await?.is_none() {
        println!("{} Run not found: {}", WARN, style(&cmd.run_id).bold());
    } else {
        manager.delete_run(&cmd.run_id).await?;
        println!("{} Deleted checkpoints for {}", CHECK, style(&cmd.run_id).cyan());
    }

    manager.close().await
}

async fn cleanup(cmd: &CleanupCommand, cli: &Cli, engine: &EngineConfig) -> Result<()> {
    let store = open_store(cli, engine).await?;
    let interval = cmd
        .interval_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| engine.cleanup_interval());
    let task = CheckpointCleanupTask::with_interval(store.clone(), interval);

    let deleted = task.run_once().await;
    println!("{} Deleted {} expired checkpoint(s)", CHECK, style(deleted).cyan());

    if cmd.watch {
        task.start();
        println!(
            "{}Sweeping every {} (Ctrl-C to stop)",
            HOURGLASS,
            style(format_duration(interval)).cyan()
        );
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        task.stop();
        println!("{} Cleanup stopped", INFO);
    }

    store.close().await
}

//! CLI output formatting

use crate::core::{CheckpointStatus, PipelineManifest};
use crate::persistence::CheckpointRecord;
use chrono::{DateTime, Utc};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static HOURGLASS: Emoji<'_, '_> = Emoji("⏳ ", "~ ");

/// Format a checkpoint status for display
pub fn format_status(status: CheckpointStatus) -> String {
    match status {
        CheckpointStatus::InProgress => style("IN PROGRESS").yellow().to_string(),
        CheckpointStatus::Paused => style("PAUSED").blue().to_string(),
        CheckpointStatus::Completed => style("COMPLETED").green().to_string(),
        CheckpointStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Human-friendly duration, e.g. `1h 5m 3s`
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Describe an expiry relative to `now`
pub fn format_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    match expires_at.signed_duration_since(now).to_std() {
        Ok(remaining) if !remaining.is_zero() => format!("expires in {}", format_duration(remaining)),
        _ => style("expired").red().to_string(),
    }
}

/// Lines describing a checkpoint row
pub fn format_checkpoint(record: &CheckpointRecord, now: DateTime<Utc>) -> Vec<String> {
    let mut lines = vec![
        format!("  Run: {}", style(&record.run_id).cyan()),
        format!("  Pipeline: {}", style(&record.pipeline_id).bold()),
        format!("  Step: {}", record.step),
        format!("  Status: {}", format_status(record.status)),
        format!("  Updated: {}", style(record.updated_at.to_rfc3339()).dim()),
        format!("  Expiry: {}", format_expiry(record.expires_at, now)),
        format!("  Outputs: {}", style(record.context.outputs.len()).cyan()),
    ];

    if let Some(pause) = &record.pause {
        lines.push(format!(
            "  {}Waiting at '{}': {}",
            HOURGLASS,
            style(&pause.step_name).yellow(),
            pause.prompt
        ));
        if let Some(choices) = &pause.choices {
            lines.push(format!("    Choices: {}", choices.join(", ")));
        }
        lines.push(format!("    Resume behavior: {}", pause.resume_behavior.as_str()));
    }

    if record.context.handoff_depth() > 0 {
        lines.push(format!(
            "  Handoffs: {}",
            style(record.context.handoff_depth()).cyan()
        ));
    }

    lines
}

/// Summary lines for a validated manifest
pub fn format_manifest(manifest: &PipelineManifest) -> Vec<String> {
    let mut lines = vec![
        format!("  Id: {}", style(&manifest.id).bold()),
        format!("  Steps: {}", style(manifest.steps.len()).cyan()),
    ];
    for (index, step) in manifest.steps.iter().enumerate() {
        let target = step.agent.as_deref().or(step.function.as_deref()).unwrap_or("-");
        lines.push(format!(
            "    {}. {} ({:?} {})",
            index,
            style(&step.name).bold(),
            step.kind,
            style(target).dim()
        ));
    }
    for handoff in &manifest.handoffs {
        lines.push(format!(
            "  Handoffs from {}: {}",
            style(&handoff.source_agent).bold(),
            handoff.allowed_targets.join(", ")
        ));
    }
    lines
}

//! Test: Failure Handling - step errors and unreliable checkpoint storage

use crate::helpers::*;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use waypoint::agent::AgentRegistry;
use waypoint::persistence::CheckpointManager;
use waypoint::{
    CheckpointStatus, ExecuteOptions, PipelineConfig, PipelineContext, PipelineExecutor, RunOutcome, Step,
};

/// Test that a failing step stops the run and marks the checkpoint failed
#[tokio::test]
async fn test_step_failure_marks_run_failed() {
    let (fetch, _) = counting_step("fetch", json!({"rows": 3}));
    let explode = Step::function("transform", |_ctx: PipelineContext| async {
        Err::<Value, _>(anyhow::anyhow!("column 'price' missing"))
    });
    let (report, report_calls) = counting_step("report", json!("done"));
    let pipeline = PipelineConfig::new("etl").step(fetch).step(explode).step(report);

    let (manager, storage) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager.clone());

    let result = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new())
        .await
        .unwrap();

    assert!(!result.success());
    assert_eq!(
        result.outcome,
        RunOutcome::Failed {
            step: "transform".to_string(),
            error: "column 'price' missing".to_string(),
        }
    );
    assert_eq!(report_calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.context.output("fetch"), Some(&json!({"rows": 3})));
    assert!(result.context.output("transform").is_none());

    assert_eq!(
        storage.status_updates(),
        vec![(result.run_id.clone(), CheckpointStatus::Failed)]
    );
    let latest = manager.get_latest_checkpoint(&result.run_id).await.unwrap().unwrap();
    assert_eq!(latest.step, 1);
    assert_eq!(latest.status, CheckpointStatus::Failed);
}

/// Test that an agent error is reported with the agent's name
#[tokio::test]
async fn test_agent_failure() {
    // No scripted responses: the first call errors
    let agent = ScriptedAgent::new(vec![]);
    let pipeline = PipelineConfig::new("chat").step(Step::agent("reply", "assistant"));
    let executor = PipelineExecutor::new(AgentRegistry::new().with_agent("assistant", agent));

    let result = executor
        .execute_pipeline(&pipeline, json!("hello"), ExecuteOptions::new())
        .await
        .unwrap();

    assert!(!result.success());
    assert!(result.error().unwrap().starts_with("Agent 'assistant' failed"));
}

/// Test that checkpoint write failures never abort a run
#[tokio::test]
async fn test_checkpoint_failures_are_not_fatal() {
    let (a, _) = counting_step("a", json!(1));
    let (b, _) = counting_step("b", json!(2));
    let pipeline = PipelineConfig::new("ab").step(a).step(b);

    let storage = Arc::new(FailingStorage::default());
    let executor = PipelineExecutor::new(AgentRegistry::new())
        .with_checkpoint_manager(Arc::new(CheckpointManager::new(storage.clone())));

    let result = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new())
        .await
        .unwrap();

    assert!(result.is_completed());
    assert_eq!(result.final_output(), Some(&json!(2)));
    // Two snapshots and the completion update were all attempted
    assert_eq!(storage.attempts.load(Ordering::SeqCst), 3);
}

/// Test that a pause is still reported when its checkpoint cannot be written
#[tokio::test]
async fn test_pause_survives_storage_failure() {
    let (gate, _) = counting_step("gate", json!({"pause": true, "prompt": "Continue?"}));
    let pipeline = PipelineConfig::new("gate").step(gate);

    let storage = Arc::new(FailingStorage::default());
    let executor = PipelineExecutor::new(AgentRegistry::new())
        .with_checkpoint_manager(Arc::new(CheckpointManager::new(storage)));

    let result = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new())
        .await
        .unwrap();

    assert!(result.is_paused());
    assert_eq!(result.pending_pause().unwrap().prompt, "Continue?");
}

/// Test that invalid pipelines are rejected before any step runs
#[tokio::test]
async fn test_duplicate_step_names_rejected() {
    let (first, first_calls) = counting_step("same", json!(1));
    let (second, _) = counting_step("same", json!(2));
    let pipeline = PipelineConfig::new("dupes").step(first).step(second);
    let executor = PipelineExecutor::new(AgentRegistry::new());

    let err = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Duplicate step name: same"));
    assert_eq!(first_calls.load(Ordering::SeqCst), 0);
}

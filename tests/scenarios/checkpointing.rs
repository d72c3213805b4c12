//! Test: Checkpointing - one snapshot per step boundary

use crate::helpers::*;
use serde_json::json;
use std::sync::atomic::Ordering;
use waypoint::{CheckpointSettings, CheckpointStatus, ExecuteOptions, PipelineConfig, PipelineExecutor};
use waypoint::agent::AgentRegistry;

/// Test that a three step run saves a snapshot before each step
#[tokio::test]
async fn test_snapshot_before_every_step() {
    let (a, _) = counting_step("a", json!("A"));
    let (b, _) = counting_step("b", json!("B"));
    let (c, _) = counting_step("c", json!("C"));
    let pipeline = PipelineConfig::new("abc").step(a).step(b).step(c);

    let (manager, storage) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager.clone());

    let result = executor
        .execute_pipeline(&pipeline, json!("go"), ExecuteOptions::new())
        .await
        .unwrap();

    assert!(result.success());
    assert_eq!(result.final_output(), Some(&json!("C")));
    let outputs: Vec<_> = result.context.outputs.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    assert_eq!(outputs, vec![("a", json!("A")), ("b", json!("B")), ("c", json!("C"))]);

    let saves = storage.saves();
    assert_eq!(saves.len(), 3);
    for (index, (run_id, step, status)) in saves.iter().enumerate() {
        assert_eq!(run_id, &result.run_id);
        assert_eq!(*step, index);
        assert_eq!(*status, CheckpointStatus::InProgress);
    }

    // The last row is marked completed once the run finishes
    assert_eq!(
        storage.status_updates(),
        vec![(result.run_id.clone(), CheckpointStatus::Completed)]
    );
    let latest = manager.get_latest_checkpoint(&result.run_id).await.unwrap().unwrap();
    assert_eq!(latest.step, 2);
    assert_eq!(latest.status, CheckpointStatus::Completed);
}

/// Test that a snapshot holds the context as it was before its step ran
#[tokio::test]
async fn test_snapshot_reflects_prior_outputs() {
    let (a, _) = counting_step("a", json!(1));
    let (b, _) = counting_step("b", json!(2));
    let pipeline = PipelineConfig::new("ab").step(a).step(b);

    let (manager, _) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager.clone());

    let result = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new())
        .await
        .unwrap();

    let first = manager.get_checkpoint(&result.run_id, 0).await.unwrap().unwrap();
    assert!(first.context.outputs.is_empty());
    let second = manager.get_checkpoint(&result.run_id, 1).await.unwrap().unwrap();
    assert_eq!(second.context.outputs.get("a"), Some(&json!(1)));
    assert!(second.context.outputs.get("b").is_none());
}

/// Test that starting at step k only runs steps k..N
#[tokio::test]
async fn test_start_step_skips_earlier_steps() {
    let (a, a_calls) = counting_step("a", json!("A"));
    let (b, b_calls) = counting_step("b", json!("B"));
    let (c, c_calls) = counting_step("c", json!("C"));
    let pipeline = PipelineConfig::new("abc").step(a).step(b).step(c);

    let (manager, storage) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager);

    let result = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new().starting_at(1))
        .await
        .unwrap();

    assert!(result.is_completed());
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c_calls.load(Ordering::SeqCst), 1);
    let steps: Vec<_> = storage.saves().iter().map(|(_, step, _)| *step).collect();
    assert_eq!(steps, vec![1, 2]);
}

/// Test that starting past the last step completes with no work
#[tokio::test]
async fn test_start_step_at_end_is_noop() {
    let (a, a_calls) = counting_step("a", json!("A"));
    let pipeline = PipelineConfig::new("a").step(a);
    let executor = PipelineExecutor::new(AgentRegistry::new());

    let result = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new().starting_at(1))
        .await
        .unwrap();

    assert!(result.is_completed());
    assert_eq!(result.final_output(), Some(&json!(null)));
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
}

/// Test that disabling checkpoints skips in-progress snapshots
#[tokio::test]
async fn test_disabled_checkpoints_skip_snapshots() {
    let (a, _) = counting_step("a", json!(1));
    let pipeline = PipelineConfig::new("quiet")
        .step(a)
        .with_checkpoint(CheckpointSettings::disabled());

    let (manager, storage) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager);

    let result = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new())
        .await
        .unwrap();

    assert!(result.is_completed());
    assert!(storage.saves().is_empty());
}

/// Test that a per-call manager overrides the executor's
#[tokio::test]
async fn test_per_call_manager_override() {
    let (a, _) = counting_step("a", json!(1));
    let pipeline = PipelineConfig::new("a").step(a);

    let (default_manager, default_storage) = recording_manager();
    let (call_manager, call_storage) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(default_manager);

    executor
        .execute_pipeline(
            &pipeline,
            json!(null),
            ExecuteOptions::new().with_checkpoint_manager(call_manager),
        )
        .await
        .unwrap();

    assert!(default_storage.saves().is_empty());
    assert_eq!(call_storage.saves().len(), 1);
}

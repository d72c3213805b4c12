//! Test: Pause/Resume - human-in-the-loop steps

use crate::helpers::*;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;
use waypoint::agent::AgentRegistry;
use waypoint::persistence::CheckpointCleanupTask;
use waypoint::tools::{HumanInputTool, Tool};
use waypoint::{
    AgentResponse, CheckpointStatus, EngineError, ExecuteOptions, PauseMetadata, PipelineConfig, PipelineExecutor,
    ResumeBehavior, ResumeOptions, Step,
};

/// Test that a paused run resumed with `continue` moves on to the next step
#[tokio::test]
async fn test_continue_runs_following_step() {
    let (draft, draft_calls) = counting_step("draft", json!("draft text"));
    let (approve, approve_calls) = counting_step("approve", json!({"pause": true, "prompt": "Approve?"}));
    let (publish, publish_calls) = counting_step("publish", json!("published"));
    let pipeline = PipelineConfig::new("review").step(draft).step(approve).step(publish);

    let (manager, _) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager.clone());

    let paused = executor
        .execute_pipeline(&pipeline, json!("topic"), ExecuteOptions::new())
        .await
        .unwrap();

    assert!(paused.success());
    assert!(paused.is_paused());
    let pending = paused.pending_pause().unwrap();
    assert_eq!(pending.prompt, "Approve?");
    assert_eq!(pending.step_name, "approve");
    assert_eq!(pending.step_index, 1);
    assert_eq!(publish_calls.load(Ordering::SeqCst), 0);

    let stored = manager.get_latest_checkpoint(&paused.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, CheckpointStatus::Paused);
    assert_eq!(stored.step, 1);
    assert_eq!(stored.pause.as_ref().map(|p| p.prompt.as_str()), Some("Approve?"));

    let resumed = executor
        .resume_pipeline(
            &paused.run_id,
            ResumeOptions::new(json!("yes")).with_behavior(ResumeBehavior::Continue),
        )
        .await
        .unwrap();

    assert!(resumed.is_completed());
    assert_eq!(resumed.run_id, paused.run_id);
    assert_eq!(resumed.final_output(), Some(&json!("published")));
    assert_eq!(draft_calls.load(Ordering::SeqCst), 1);
    assert_eq!(approve_calls.load(Ordering::SeqCst), 1);
    assert_eq!(publish_calls.load(Ordering::SeqCst), 1);

    // The paused step's output is the human's answer
    assert_eq!(
        resumed.context.output("approve"),
        Some(&json!({"type": "human_response", "prompt": "Approve?", "response": "yes"}))
    );
    assert_eq!(resumed.context.output("draft"), Some(&json!("draft text")));
    assert_eq!(resumed.context.metadata_value("humanInput"), Some(&json!("yes")));
    assert_eq!(resumed.context.history.last().map(|m| m.content.as_str()), Some("yes"));

    let latest = manager.get_latest_checkpoint(&paused.run_id).await.unwrap().unwrap();
    assert_eq!(latest.status, CheckpointStatus::Completed);
}

/// Test that `rerun` executes the paused step again with the human input
#[tokio::test]
async fn test_rerun_sees_human_input() {
    let (gate, gate_calls) = approval_step("gate", "Ship it?");
    let pipeline = PipelineConfig::new("ship").step(gate);

    let (manager, _) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager);

    let paused = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new())
        .await
        .unwrap();
    assert!(paused.is_paused());

    let resumed = executor
        .resume_pipeline(
            &paused.run_id,
            ResumeOptions::new(json!("ship")).with_behavior(ResumeBehavior::Rerun),
        )
        .await
        .unwrap();

    assert!(resumed.is_completed());
    assert_eq!(gate_calls.load(Ordering::SeqCst), 2);
    assert_eq!(resumed.final_output(), Some(&json!({"approved": "ship"})));
}

/// Test that the behavior stored with the pause is used when none is given
#[tokio::test]
async fn test_stored_behavior_is_default() {
    let signal = PauseMetadata::new("Which region?")
        .with_choices(vec!["eu".to_string(), "us".to_string()])
        .with_resume_behavior(ResumeBehavior::Rerun);
    let (ask, ask_calls) = counting_step("ask", signal.to_request_value());
    let pipeline = PipelineConfig::new("regions").step(ask);

    let (manager, _) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager);

    let paused = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new())
        .await
        .unwrap();
    let pending = paused.pending_pause().unwrap();
    assert_eq!(pending.resume_behavior, ResumeBehavior::Rerun);
    assert_eq!(pending.choices, Some(vec!["eu".to_string(), "us".to_string()]));

    // The step pauses again because it reruns
    let again = executor
        .resume_pipeline(&paused.run_id, ResumeOptions::new(json!("eu")))
        .await
        .unwrap();
    assert!(again.is_paused());
    assert_eq!(ask_calls.load(Ordering::SeqCst), 2);
}

/// Test that an agent's embedded human-input tool call pauses the run
#[tokio::test]
async fn test_embedded_tool_pause() {
    let arguments = json!({"prompt": "Refund $40?", "choices": ["yes", "no"]});
    let tool_result = HumanInputTool.execute(&arguments).await.unwrap();
    let response = AgentResponse::new("Checking with a human")
        .with_tool_call("request_human_input", arguments, tool_result)
        .into_value();

    let agent = ScriptedAgent::new(vec![response, json!("refund issued")]);
    let pipeline = PipelineConfig::new("refunds").step(Step::agent("decide", "billing"));

    let (manager, _) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new().with_agent("billing", agent.clone()))
        .with_checkpoint_manager(manager);

    let paused = executor
        .execute_pipeline(&pipeline, json!("customer wants refund"), ExecuteOptions::new())
        .await
        .unwrap();

    let pending = paused.pending_pause().unwrap();
    assert_eq!(pending.prompt, "Refund $40?");
    assert_eq!(pending.active_agent.as_deref(), Some("billing"));
    assert_eq!(pending.resume_behavior, ResumeBehavior::Continue);

    let resumed = executor
        .resume_pipeline(
            &paused.run_id,
            ResumeOptions::new(json!("yes")).with_behavior(ResumeBehavior::Rerun),
        )
        .await
        .unwrap();
    assert_eq!(resumed.final_output(), Some(&json!("refund issued")));
    assert_eq!(agent.calls(), 2);
    assert_eq!(agent.seen()[1].metadata.get("humanInput"), Some(&json!("yes")));
}

/// Test that the resume conversation id overrides the stored one
#[tokio::test]
async fn test_resume_conversation_override() {
    let (gate, _) = counting_step("gate", json!({"pause": true, "prompt": "?"}));
    let pipeline = PipelineConfig::new("conv").step(gate);

    let (manager, _) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager);

    let paused = executor
        .execute_pipeline(
            &pipeline,
            json!(null),
            ExecuteOptions::new().with_conversation_id("conv-1"),
        )
        .await
        .unwrap();
    assert_eq!(paused.context.conversation_id.as_deref(), Some("conv-1"));

    let resumed = executor
        .resume_pipeline(
            &paused.run_id,
            ResumeOptions::new(json!("ok")).with_conversation_id("conv-2"),
        )
        .await
        .unwrap();
    assert_eq!(resumed.context.conversation_id.as_deref(), Some("conv-2"));
}

/// Test that an expired pause cannot be resumed and is swept by cleanup
#[tokio::test]
async fn test_expired_pause_is_rejected_and_swept() {
    let signal = PauseMetadata::new("Too late?").with_ttl_ms(20);
    let (gate, _) = counting_step("gate", signal.to_request_value());
    let pipeline = PipelineConfig::new("late").step(gate);

    let (manager, storage) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager.clone());

    let paused = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new())
        .await
        .unwrap();
    assert!(paused.is_paused());

    tokio::time::sleep(Duration::from_millis(60)).await;

    let err = executor
        .resume_pipeline(&paused.run_id, ResumeOptions::new(json!("now")))
        .await
        .unwrap_err();
    assert!(err.is_expired());
    assert!(matches!(err, EngineError::PauseExpired { ref run_id, .. } if run_id == &paused.run_id));

    let cleanup = CheckpointCleanupTask::new(storage);
    assert!(cleanup.run_once().await >= 1);
    assert!(manager.get_latest_checkpoint(&paused.run_id).await.unwrap().is_none());
}

/// Test that an expired pause after earlier steps is swept with the whole run
#[tokio::test]
async fn test_expired_pause_after_first_step_is_swept_with_run() {
    let (draft, _) = counting_step("draft", json!("draft text"));
    let (sign_off, _) = counting_step("sign_off", PauseMetadata::new("Sign off?").with_ttl_ms(20).to_request_value());
    let (publish, publish_calls) = counting_step("publish", json!("published"));
    let pipeline = PipelineConfig::new("late-review").step(draft).step(sign_off).step(publish);

    let (manager, storage) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager.clone());

    let paused = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new())
        .await
        .unwrap();
    assert_eq!(paused.pending_pause().unwrap().step_index, 1);

    // The earlier row shares the pause's expiry
    let pause_expiry = paused.pending_pause().unwrap().expires_at;
    let draft_row = manager.get_checkpoint(&paused.run_id, 0).await.unwrap().unwrap();
    assert_eq!(draft_row.expires_at, pause_expiry);

    tokio::time::sleep(Duration::from_millis(60)).await;

    let err = executor
        .resume_pipeline(&paused.run_id, ResumeOptions::new(json!("yes")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PauseExpired { .. }));

    let cleanup = CheckpointCleanupTask::new(storage);
    assert_eq!(cleanup.run_once().await, 2);
    assert!(manager.get_latest_checkpoint(&paused.run_id).await.unwrap().is_none());

    let err = executor
        .resume_pipeline(&paused.run_id, ResumeOptions::new(json!("yes")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RunNotFound(ref run_id) if run_id == &paused.run_id));
    assert_eq!(publish_calls.load(Ordering::SeqCst), 0);
}

/// Test that a run that is not paused cannot be resumed
#[tokio::test]
async fn test_resume_running_run_is_rejected() {
    let (a, _) = counting_step("a", json!(1));
    let pipeline = PipelineConfig::new("done").step(a);

    let (manager, _) = recording_manager();
    let executor = PipelineExecutor::new(AgentRegistry::new()).with_checkpoint_manager(manager);

    let finished = executor
        .execute_pipeline(&pipeline, json!(null), ExecuteOptions::new())
        .await
        .unwrap();

    let err = executor
        .resume_pipeline(&finished.run_id, ResumeOptions::new(json!("x")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotPaused { .. }));
}

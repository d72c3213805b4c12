//! Pipeline executor - drives a run step by step
//!
//! Each run executes its steps sequentially on the calling task. Checkpoint
//! writes are best-effort: a failing store is logged and never changes the
//! run's outcome. Pauses, handoff denials and step failures are reported in
//! [`PipelineResult`]; [`EngineError`] is reserved for calls that cannot
//! produce a result at all.

use crate::agent::{AgentContext, AgentRegistry};
use crate::core::{
    CheckpointStatus, HistoryMessage, PipelineConfig, PipelineContext, Step, StepAction, HUMAN_INPUT_KEY,
};
use crate::error::{EngineError, StepError};
use crate::execution::outcome::{classify_step_result, StepOutcome};
use crate::handoff::{
    append_handoff_chain, handoff_error_output, prepare_handoff_context, validate_handoff_target,
    HandoffChainEntry, HandoffConfig, HandoffPolicy, HandoffRequest, HandoffResult,
};
use crate::observability::{self, LogLevel, ObservabilitySink, StructuredLog};
use crate::pause::{ttl_from_millis, PauseMetadata, PausePoint, PendingPause, ResumeBehavior};
use crate::persistence::{new_run_id, CheckpointManager, CheckpointRecord, DEFAULT_CHECKPOINT_TTL_MS};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

/// Per-call options for [`PipelineExecutor::execute_pipeline`]
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Use this run id instead of generating one
    pub run_id: Option<String>,

    /// Overrides the executor's checkpoint manager for this run
    pub checkpoint_manager: Option<Arc<CheckpointManager>>,

    /// Index of the first step to execute
    pub start_step: usize,

    /// Context to continue from (outputs, history and metadata are merged)
    pub restored_context: Option<PipelineContext>,

    /// Takes precedence over the restored context's conversation id
    pub conversation_id: Option<String>,

    /// Agent to invoke for the first executed step instead of the step's own
    pub resume_agent: Option<String>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_checkpoint_manager(mut self, manager: Arc<CheckpointManager>) -> Self {
        self.checkpoint_manager = Some(manager);
        self
    }

    pub fn starting_at(mut self, start_step: usize) -> Self {
        self.start_step = start_step;
        self
    }

    pub fn with_restored_context(mut self, context: PipelineContext) -> Self {
        self.restored_context = Some(context);
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn resuming_agent(mut self, agent: impl Into<String>) -> Self {
        self.resume_agent = Some(agent.into());
        self
    }
}

/// Per-call options for [`PipelineExecutor::resume_pipeline`]
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeOptions {
    /// The human's answer to the pause prompt
    pub human_input: Value,

    /// Overrides the behavior stored with the pause
    pub resume_behavior: Option<ResumeBehavior>,

    pub conversation_id: Option<String>,
}

impl ResumeOptions {
    pub fn new(human_input: Value) -> Self {
        Self {
            human_input,
            resume_behavior: None,
            conversation_id: None,
        }
    }

    pub fn with_behavior(mut self, behavior: ResumeBehavior) -> Self {
        self.resume_behavior = Some(behavior);
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// How a run invocation ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every step ran; `final_output` is the last step's output
    Completed { final_output: Value },
    /// Waiting for human input; resume with the same run id
    Paused(PendingPause),
    /// A step failed
    Failed { step: String, error: String },
}

/// Result of executing or resuming a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub run_id: String,
    pub context: PipelineContext,
    pub outcome: RunOutcome,
}

impl PipelineResult {
    /// True unless a step failed; a paused run is not a failure
    pub fn success(&self) -> bool {
        !matches!(self.outcome, RunOutcome::Failed { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.outcome, RunOutcome::Paused(_))
    }

    pub fn final_output(&self) -> Option<&Value> {
        match &self.outcome {
            RunOutcome::Completed { final_output } => Some(final_output),
            _ => None,
        }
    }

    pub fn pending_pause(&self) -> Option<&PendingPause> {
        match &self.outcome {
            RunOutcome::Paused(pause) => Some(pause),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// What a single step slot produced
enum SlotResult {
    Output(Value),
    Paused {
        metadata: PauseMetadata,
        active_agent: Option<String>,
    },
}

/// Everything a run invocation carries between steps
struct RunState<'a> {
    config: &'a PipelineConfig,
    run_id: String,
    context: PipelineContext,
    manager: Option<Arc<CheckpointManager>>,
    resume_agent: Option<String>,
}

/// Drives pipeline runs
pub struct PipelineExecutor {
    agents: AgentRegistry,
    checkpoint_manager: Option<Arc<CheckpointManager>>,
    sink: Option<Arc<dyn ObservabilitySink>>,
    handoff_policy: RwLock<Arc<HandoffPolicy>>,
    pipelines: tokio::sync::RwLock<HashMap<String, PipelineConfig>>,
}

impl PipelineExecutor {
    pub fn new(agents: AgentRegistry) -> Self {
        Self {
            agents,
            checkpoint_manager: None,
            sink: None,
            handoff_policy: RwLock::new(Arc::new(HandoffPolicy::default())),
            pipelines: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Default checkpoint manager, also used to look up runs on resume
    pub fn with_checkpoint_manager(mut self, manager: Arc<CheckpointManager>) -> Self {
        self.checkpoint_manager = Some(manager);
        self
    }

    pub fn with_observability(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_handoff_policy(self, policy: HandoffPolicy) -> Self {
        self.replace_handoff_policy(policy);
        self
    }

    pub fn checkpoint_manager(&self) -> Option<Arc<CheckpointManager>> {
        self.checkpoint_manager.clone()
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Snapshot of the current handoff policy
    pub fn handoff_policy(&self) -> Arc<HandoffPolicy> {
        self.handoff_policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap the handoff policy; runs already in a step keep their snapshot
    pub fn replace_handoff_policy(&self, policy: HandoffPolicy) {
        info!(max_depth = policy.max_depth, agents = policy.agents.len(), "Replacing handoff policy");
        *self
            .handoff_policy
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(policy);
    }

    /// Make a pipeline resumable by this executor
    pub async fn register_pipeline(&self, config: PipelineConfig) -> Result<(), EngineError> {
        config.validate()?;
        debug!(pipeline = %config.id, "Registering pipeline");
        self.pipelines.write().await.insert(config.id.clone(), config);
        Ok(())
    }

    pub async fn is_registered(&self, pipeline_id: &str) -> bool {
        self.pipelines.read().await.contains_key(pipeline_id)
    }

    /// Execute a pipeline from `options.start_step` to its last step
    ///
    /// The pipeline is registered so paused runs can later be resumed.
    pub async fn execute_pipeline(
        &self,
        config: &PipelineConfig,
        input: Value,
        options: ExecuteOptions,
    ) -> Result<PipelineResult, EngineError> {
        config.validate()?;
        if options.start_step > config.steps.len() {
            return Err(EngineError::invalid_pipeline(format!(
                "Start step {} is out of range for pipeline '{}' with {} steps",
                options.start_step,
                config.id,
                config.steps.len()
            )));
        }
        self.register_pipeline(config.clone()).await?;

        let manager = options
            .checkpoint_manager
            .or_else(|| self.checkpoint_manager.clone());
        let run_id = options
            .run_id
            .or_else(|| manager.as_ref().map(|m| m.generate_run_id()))
            .unwrap_or_else(new_run_id);

        let mut context = PipelineContext::new(config.id.clone(), input);
        if let Some(restored) = &options.restored_context {
            context.merge_restored(restored);
            context.conversation_id = restored.conversation_id.clone();
        }
        if let Some(conversation_id) = options.conversation_id {
            context.conversation_id = Some(conversation_id);
        }
        context.run_id = Some(run_id.clone());

        info!(
            run_id = %run_id,
            pipeline = %config.id,
            start_step = options.start_step,
            steps = config.steps.len(),
            "Starting pipeline run"
        );

        let state = RunState {
            config,
            run_id,
            context,
            manager,
            resume_agent: options.resume_agent,
        };
        Ok(self.run_from(state, options.start_step).await)
    }

    /// Resume a paused run with human input
    pub async fn resume_pipeline(
        &self,
        run_id: &str,
        options: ResumeOptions,
    ) -> Result<PipelineResult, EngineError> {
        let manager = self
            .checkpoint_manager
            .clone()
            .ok_or(EngineError::CheckpointsUnavailable)?;

        let record = manager
            .get_latest_checkpoint(run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))?;

        let pending = match (&record.status, &record.pause) {
            (CheckpointStatus::Paused, Some(pending)) => pending.clone(),
            _ => {
                return Err(EngineError::NotPaused {
                    run_id: run_id.to_string(),
                    status: record.status,
                })
            }
        };
        pending.ensure_resumable(Utc::now())?;

        let config = self
            .pipelines
            .read()
            .await
            .get(&record.pipeline_id)
            .cloned()
            .ok_or_else(|| EngineError::PipelineNotRegistered(record.pipeline_id.clone()))?;

        let behavior = options.resume_behavior.unwrap_or(pending.resume_behavior);
        let mut context = record.context;
        context.set_metadata(HUMAN_INPUT_KEY, options.human_input.clone());
        context.push_history(HistoryMessage::user(&options.human_input));

        let start_step = match behavior {
            ResumeBehavior::Rerun => pending.step_index,
            ResumeBehavior::Continue => {
                if context.output(&pending.step_name).is_none() {
                    context.record_output(
                        &pending.step_name,
                        json!({
                            "type": "human_response",
                            "prompt": pending.prompt,
                            "response": options.human_input,
                        }),
                    );
                }
                pending.step_index + 1
            }
        };

        info!(
            run_id = %run_id,
            pipeline = %config.id,
            step = %pending.step_name,
            behavior = behavior.as_str(),
            "Resuming paused run"
        );

        let mut execute = ExecuteOptions::new()
            .with_run_id(run_id)
            .with_checkpoint_manager(manager)
            .starting_at(start_step)
            .with_restored_context(context.clone());
        execute.conversation_id = options.conversation_id;
        // A rerun re-enters the agent that paused, not the one that handed off
        if let (ResumeBehavior::Rerun, Some(agent)) = (behavior, &pending.active_agent) {
            execute = execute.resuming_agent(agent.clone());
        }

        self.execute_pipeline(&config, context.input, execute).await
    }

    async fn run_from(&self, mut state: RunState<'_>, start_step: usize) -> PipelineResult {
        let config = state.config;

        for (index, step) in config.steps.iter().enumerate().skip(start_step) {
            if config.checkpoints_enabled() {
                if let Some(manager) = &state.manager {
                    let record = CheckpointRecord::new(
                        state.run_id.clone(),
                        index,
                        CheckpointStatus::InProgress,
                        state.context.clone(),
                        manager.expires_at(config.checkpoint_ttl_ms()),
                    );
                    best_effort(&state.run_id, "write", manager.save_checkpoint(&record)).await;
                }
            }

            debug!(run_id = %state.run_id, step = %step.name, index, "Executing step");

            let resume_agent = if index == start_step {
                state.resume_agent.take()
            } else {
                None
            };

            match self.run_slot(config, step, resume_agent, &mut state.context).await {
                Ok(SlotResult::Output(output)) => {
                    debug!(run_id = %state.run_id, step = %step.name, "Step completed");
                    state.context.record_output(&step.name, output);
                }
                Ok(SlotResult::Paused {
                    metadata,
                    active_agent,
                }) => {
                    return self.pause(state, step, index, metadata, active_agent).await;
                }
                Err(e) => {
                    return self.fail(state, step, e).await;
                }
            }
        }

        self.complete(state).await
    }

    /// Execute one step slot, following accepted handoffs on the same slot
    ///
    /// `resume_agent` replaces the step's own action for the first invocation.
    async fn run_slot(
        &self,
        config: &PipelineConfig,
        step: &Step,
        resume_agent: Option<String>,
        context: &mut PipelineContext,
    ) -> Result<SlotResult, StepError> {
        let (mut active_agent, mut result) = match resume_agent {
            Some(agent) => {
                debug!(step = %step.name, agent = %agent, "Re-entering paused agent");
                let result = self.invoke_agent(&agent, context).await?;
                (Some(agent), result)
            }
            None => (
                step.agent_name().map(str::to_string),
                self.invoke_step(step, context).await?,
            ),
        };

        loop {
            let request = match classify_step_result(&result) {
                StepOutcome::Plain => return Ok(SlotResult::Output(result)),
                StepOutcome::ToolPause(metadata) | StepOutcome::RequestPause(metadata) => {
                    return Ok(SlotResult::Paused {
                        metadata,
                        active_agent,
                    });
                }
                StepOutcome::Handoff(request) => request,
            };

            let source = active_agent.clone().unwrap_or_else(|| step.name.clone());
            let policy = self.handoff_policy();
            let handoff_config = config
                .handoff_config(&source)
                .or_else(|| policy.config_for(&source))
                .cloned()
                .unwrap_or_else(|| HandoffConfig::deny_all(source.clone()));

            if let Err(error) = policy.check_depth(context.handoff_depth()) {
                warn!(step = %step.name, source_agent = %source, target_agent = %request.target_agent, "{}", error);
                self.emit(
                    StructuredLog::warn("Handoff refused")
                        .with("sourceAgent", source.as_str())
                        .with("targetAgent", request.target_agent.as_str())
                        .with("error", error.as_str()),
                );
                return Ok(SlotResult::Output(handoff_error_output(
                    &error,
                    &handoff_config.allowed_targets,
                )));
            }

            let validation = validate_handoff_target(&request, &handoff_config);
            self.emit_validation(&source, &validation);

            let target_agent = match validation {
                HandoffResult::Accepted { target_agent } => target_agent,
                HandoffResult::Denied { error, .. } => {
                    return Ok(SlotResult::Output(handoff_error_output(
                        &error,
                        &handoff_config.allowed_targets,
                    )));
                }
            };

            result = self
                .hand_off(&request, &source, &target_agent, &handoff_config, context)
                .await?;
            active_agent = Some(target_agent);
        }
    }

    async fn invoke_step(&self, step: &Step, context: &PipelineContext) -> Result<Value, StepError> {
        match &step.action {
            StepAction::Function(function) => function.call(context).await.map_err(StepError::Function),
            StepAction::Agent(name) => self.invoke_agent(name, context).await,
        }
    }

    async fn invoke_agent(&self, name: &str, context: &PipelineContext) -> Result<Value, StepError> {
        let agent = self
            .agents
            .get(name)
            .ok_or_else(|| StepError::AgentNotRegistered(name.to_string()))?;
        agent
            .process_message(&context.input, &AgentContext::from(context))
            .await
            .map_err(|source| StepError::Agent {
                agent: name.to_string(),
                source,
            })
    }

    /// Invoke the target of an accepted handoff in place of the current agent
    async fn hand_off(
        &self,
        request: &HandoffRequest,
        source: &str,
        target: &str,
        handoff_config: &HandoffConfig,
        context: &mut PipelineContext,
    ) -> Result<Value, StepError> {
        let agent = self
            .agents
            .get(target)
            .ok_or_else(|| StepError::AgentNotRegistered(target.to_string()))?;

        let prepared = prepare_handoff_context(request, context, handoff_config);
        for (key, value) in &prepared.metadata {
            context.set_metadata(key, value.clone());
        }
        append_handoff_chain(
            context,
            HandoffChainEntry {
                from: source.to_string(),
                to: target.to_string(),
                reason: request.reason.clone(),
                at: Utc::now(),
            },
        );

        info!(
            source_agent = %source,
            target_agent = %target,
            depth = context.handoff_depth(),
            "Handing off step"
        );

        agent
            .process_message(&prepared.input, &prepared)
            .await
            .map_err(|source| StepError::Agent {
                agent: target.to_string(),
                source,
            })
    }

    async fn pause(
        &self,
        state: RunState<'_>,
        step: &Step,
        index: usize,
        metadata: PauseMetadata,
        active_agent: Option<String>,
    ) -> PipelineResult {
        let config = state.config;
        let default_ttl = config
            .checkpoint_ttl_ms()
            .map(ttl_from_millis)
            .or_else(|| state.manager.as_ref().map(|m| m.default_ttl()))
            .unwrap_or_else(|| ttl_from_millis(DEFAULT_CHECKPOINT_TTL_MS));

        let pending = PendingPause::materialize(
            &metadata,
            PausePoint {
                run_id: &state.run_id,
                pipeline_id: &config.id,
                step_name: &step.name,
                step_index: index,
                active_agent: active_agent.as_deref(),
            },
            default_ttl,
            Utc::now(),
        );

        match &state.manager {
            Some(manager) => {
                let record = CheckpointRecord::new(
                    state.run_id.clone(),
                    index,
                    CheckpointStatus::Paused,
                    state.context.clone(),
                    pending.expires_at,
                )
                .with_pause(pending.clone());
                best_effort(&state.run_id, "pause write", manager.save_checkpoint(&record)).await;
                best_effort(
                    &state.run_id,
                    "expiry alignment",
                    manager.align_expiry(&state.run_id, index, pending.expires_at),
                )
                .await;
            }
            None => warn!(
                run_id = %state.run_id,
                "Run paused without a checkpoint manager; it cannot be resumed"
            ),
        }

        info!(
            run_id = %state.run_id,
            step = %step.name,
            expires_at = %pending.expires_at,
            "Run paused for human input"
        );
        self.emit(
            StructuredLog::info("Run paused")
                .with("runId", state.run_id.as_str())
                .with("step", step.name.as_str())
                .with("prompt", pending.prompt.as_str()),
        );

        PipelineResult {
            run_id: state.run_id,
            context: state.context,
            outcome: RunOutcome::Paused(pending),
        }
    }

    async fn fail(&self, state: RunState<'_>, step: &Step, e: StepError) -> PipelineResult {
        let error = e.to_string();
        error!(run_id = %state.run_id, step = %step.name, error = %error, "Step failed");

        if let Some(manager) = &state.manager {
            best_effort(
                &state.run_id,
                "status update",
                manager.update_status(&state.run_id, CheckpointStatus::Failed),
            )
            .await;
        }
        self.emit(
            StructuredLog::new(LogLevel::Error, "Run failed")
                .with("runId", state.run_id.as_str())
                .with("step", step.name.as_str())
                .with("error", error.as_str()),
        );

        PipelineResult {
            run_id: state.run_id,
            context: state.context,
            outcome: RunOutcome::Failed {
                step: step.name.clone(),
                error,
            },
        }
    }

    async fn complete(&self, state: RunState<'_>) -> PipelineResult {
        if let Some(manager) = &state.manager {
            best_effort(
                &state.run_id,
                "status update",
                manager.update_status(&state.run_id, CheckpointStatus::Completed),
            )
            .await;
        }

        let final_output = state
            .config
            .steps
            .last()
            .and_then(|step| state.context.output(&step.name))
            .cloned()
            .unwrap_or(Value::Null);

        info!(run_id = %state.run_id, pipeline = %state.config.id, "Pipeline run completed");
        self.emit(
            StructuredLog::info("Run completed")
                .with("runId", state.run_id.as_str())
                .with("pipelineId", state.config.id.as_str()),
        );

        PipelineResult {
            run_id: state.run_id,
            context: state.context,
            outcome: RunOutcome::Completed { final_output },
        }
    }

    fn emit_validation(&self, source: &str, validation: &HandoffResult) {
        let event = match validation.error() {
            None => StructuredLog::info("Handoff allowed"),
            Some(error) => StructuredLog::warn("Handoff denied").with("error", error),
        };
        self.emit(
            event
                .with("sourceAgent", source)
                .with("targetAgent", validation.target_agent())
                .with("success", validation.success()),
        );
    }

    fn emit(&self, event: StructuredLog) {
        observability::emit(self.sink.as_ref(), event);
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("agents", &self.agents)
            .field("checkpoint_manager", &self.checkpoint_manager)
            .finish_non_exhaustive()
    }
}

/// Await a checkpoint side effect, logging instead of propagating failure
async fn best_effort<F>(run_id: &str, what: &str, write: F)
where
    F: Future<Output = anyhow::Result<()>>,
{
    if let Err(e) = write.await {
        warn!(run_id = %run_id, error = %e, "Checkpoint {} failed; continuing", what);
    }
}

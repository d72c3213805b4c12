//! Test utilities shared by the scenario suites

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use waypoint::agent::{Agent, AgentContext, AgentError};
use waypoint::core::{CheckpointStatus, PipelineContext, Step};
use waypoint::persistence::{CheckpointManager, CheckpointRecord, CheckpointStorage, InMemoryCheckpointStore};

/// Mock agent that returns predefined responses in order
pub struct ScriptedAgent {
    responses: Vec<Value>,
    index: AtomicUsize,
    seen: Mutex<Vec<AgentContext>>,
}

impl ScriptedAgent {
    pub fn new(responses: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            index: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Number of times the agent was invoked
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// Contexts the agent was invoked with
    pub fn seen(&self) -> Vec<AgentContext> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn process_message(&self, _input: &Value, context: &AgentContext) -> Result<Value, AgentError> {
        self.seen.lock().unwrap().push(context.clone());
        let idx = self.index.fetch_add(1, Ordering::SeqCst);
        self.responses.get(idx).cloned().ok_or_else(|| {
            AgentError::Internal(format!("ScriptedAgent: no response for request {}", idx + 1))
        })
    }
}

/// A function step returning `value` and counting its invocations
pub fn counting_step(name: &str, value: Value) -> (Step, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let step = Step::function(name, move |_ctx: PipelineContext| {
        let value = value.clone();
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    });
    (step, calls)
}

/// A function step whose result depends on the human input seen so far
pub fn approval_step(name: &str, prompt: &str) -> (Step, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let prompt = prompt.to_string();
    let step = Step::function(name, move |ctx: PipelineContext| {
        let counter = counter.clone();
        let prompt = prompt.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(match ctx.metadata_value("humanInput") {
                Some(answer) => json!({"approved": answer}),
                None => json!({"pause": true, "prompt": prompt}),
            })
        }
    });
    (step, calls)
}

/// A (run id, step, status) triple recorded on save
pub type SaveCall = (String, usize, CheckpointStatus);

/// In-memory storage that records every call
#[derive(Default)]
pub struct RecordingStorage {
    inner: InMemoryCheckpointStore,
    saves: Mutex<Vec<SaveCall>>,
    status_updates: Mutex<Vec<(String, CheckpointStatus)>>,
}

impl RecordingStorage {
    pub fn saves(&self) -> Vec<SaveCall> {
        self.saves.lock().unwrap().clone()
    }

    pub fn status_updates(&self) -> Vec<(String, CheckpointStatus)> {
        self.status_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckpointStorage for RecordingStorage {
    async fn save(&self, record: &CheckpointRecord) -> anyhow::Result<()> {
        self.saves
            .lock()
            .unwrap()
            .push((record.run_id.clone(), record.step, record.status));
        self.inner.save(record).await
    }

    async fn get_latest(&self, run_id: &str) -> anyhow::Result<Option<CheckpointRecord>> {
        self.inner.get_latest(run_id).await
    }

    async fn get(&self, run_id: &str, step: usize) -> anyhow::Result<Option<CheckpointRecord>> {
        self.inner.get(run_id, step).await
    }

    async fn update_status(&self, run_id: &str, status: CheckpointStatus) -> anyhow::Result<()> {
        self.status_updates
            .lock()
            .unwrap()
            .push((run_id.to_string(), status));
        self.inner.update_status(run_id, status).await
    }

    async fn delete_run(&self, run_id: &str) -> anyhow::Result<()> {
        self.inner.delete_run(run_id).await
    }

    async fn delete_expired(&self) -> anyhow::Result<u64> {
        self.inner.delete_expired().await
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.inner.close().await
    }
}

/// Storage where every operation fails
#[derive(Default)]
pub struct FailingStorage {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl CheckpointStorage for FailingStorage {
    async fn save(&self, _record: &CheckpointRecord) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("disk full")
    }

    async fn get_latest(&self, _run_id: &str) -> anyhow::Result<Option<CheckpointRecord>> {
        anyhow::bail!("disk full")
    }

    async fn get(&self, _run_id: &str, _step: usize) -> anyhow::Result<Option<CheckpointRecord>> {
        anyhow::bail!("disk full")
    }

    async fn update_status(&self, _run_id: &str, _status: CheckpointStatus) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("disk full")
    }

    async fn delete_run(&self, _run_id: &str) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    async fn delete_expired(&self) -> anyhow::Result<u64> {
        anyhow::bail!("disk full")
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Checkpoint manager over a [`RecordingStorage`]
pub fn recording_manager() -> (Arc<CheckpointManager>, Arc<RecordingStorage>) {
    let storage = Arc::new(RecordingStorage::default());
    let manager = Arc::new(CheckpointManager::new(storage.clone()));
    (manager, storage)
}

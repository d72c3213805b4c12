//! Step domain model

use crate::core::context::PipelineContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// What kind of work a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Calls a function with the current context
    Function,
    /// Sends the run input to a named agent
    Agent,
}

/// A function step's executable
#[async_trait]
pub trait StepFunction: Send + Sync {
    /// Produce this step's result from the current context
    async fn call(&self, context: &PipelineContext) -> anyhow::Result<Value>;
}

/// Adapter turning an async closure into a [`StepFunction`]
pub struct FnStep<F>(pub F);

#[async_trait]
impl<F, Fut> StepFunction for FnStep<F>
where
    F: Fn(PipelineContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn call(&self, context: &PipelineContext) -> anyhow::Result<Value> {
        (self.0)(context.clone()).await
    }
}

/// The executable behind a step
#[derive(Clone)]
pub enum StepAction {
    Function(Arc<dyn StepFunction>),
    /// Name of an agent in the executor's registry
    Agent(String),
}

/// A single named step in a pipeline
#[derive(Clone)]
pub struct Step {
    /// Unique step name within the pipeline
    pub name: String,

    pub action: StepAction,
}

impl Step {
    /// Create a function step from an async closure
    pub fn function<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::with_function(name, Arc::new(FnStep(f)))
    }

    /// Create a function step from an existing [`StepFunction`]
    pub fn with_function(name: impl Into<String>, function: Arc<dyn StepFunction>) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Function(function),
        }
    }

    /// Create a step that invokes a registered agent
    pub fn agent(name: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Agent(agent.into()),
        }
    }

    pub fn kind(&self) -> StepKind {
        match self.action {
            StepAction::Function(_) => StepKind::Function,
            StepAction::Agent(_) => StepKind::Agent,
        }
    }

    /// Agent this step starts with, if it is an agent step
    pub fn agent_name(&self) -> Option<&str> {
        match &self.action {
            StepAction::Agent(name) => Some(name),
            StepAction::Function(_) => None,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Step");
        s.field("name", &self.name).field("kind", &self.kind());
        if let Some(agent) = self.agent_name() {
            s.field("agent", &agent);
        }
        s.finish()
    }
}

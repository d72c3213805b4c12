//! Engine and pipeline configuration from YAML

use crate::core::pipeline::{CheckpointSettings, PipelineConfig};
use crate::core::step::{FnStep, Step, StepFunction, StepKind};
use crate::core::PipelineContext;
use crate::handoff::{HandoffConfig, HandoffPolicy, DEFAULT_MAX_HANDOFF_DEPTH};
use crate::pause::ttl_from_millis;
use crate::persistence::{DEFAULT_CHECKPOINT_TTL_MS, DEFAULT_CLEANUP_INTERVAL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default checkpoint database location under the platform data directory
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("waypoint")
        .join("checkpoints.db")
}

/// Process-wide engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub checkpoint: CheckpointEngineConfig,

    #[serde(default)]
    pub handoff: HandoffEngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEngineConfig {
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// SQLite database file; defaults to [`default_database_path`]
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffEngineConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Fallback rules for agents a pipeline does not declare
    #[serde(default)]
    pub agents: Vec<HandoffConfig>,
}

fn default_ttl_ms() -> u64 {
    DEFAULT_CHECKPOINT_TTL_MS
}

fn default_cleanup_interval_ms() -> u64 {
    DEFAULT_CLEANUP_INTERVAL.as_millis() as u64
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_HANDOFF_DEPTH
}

impl Default for CheckpointEngineConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            database_path: None,
        }
    }
}

impl Default for HandoffEngineConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            agents: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load engine configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse engine configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.checkpoint.default_ttl_ms == 0 {
            anyhow::bail!("checkpoint.default_ttl_ms must be greater than zero");
        }
        if self.checkpoint.cleanup_interval_ms == 0 {
            anyhow::bail!("checkpoint.cleanup_interval_ms must be greater than zero");
        }
        let mut sources = HashSet::new();
        for agent in &self.handoff.agents {
            if agent.source_agent.trim().is_empty() {
                anyhow::bail!("handoff.agents entry has an empty source_agent");
            }
            if !sources.insert(agent.source_agent.as_str()) {
                anyhow::bail!("Duplicate handoff config for agent '{}'", agent.source_agent);
            }
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> chrono::Duration {
        ttl_from_millis(self.checkpoint.default_ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint.cleanup_interval_ms)
    }

    pub fn database_path(&self) -> PathBuf {
        self.checkpoint
            .database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }

    /// Handoff policy for an executor built from this config
    pub fn handoff_policy(&self) -> HandoffPolicy {
        self.handoff
            .agents
            .iter()
            .cloned()
            .fold(HandoffPolicy::new(self.handoff.max_depth), HandoffPolicy::with_agent)
    }
}

/// Named step functions a manifest can refer to
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn StepFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async closure under `name`
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.functions.insert(name.into(), Arc::new(FnStep(f)));
    }

    pub fn with_function<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register(name, f);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StepFunction>> {
        self.functions.get(name).cloned()
    }
}

/// Pipeline definition as written in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineManifest {
    pub id: String,

    pub steps: Vec<StepManifest>,

    #[serde(default)]
    pub checkpoint: Option<CheckpointSettings>,

    #[serde(default)]
    pub handoffs: Vec<HandoffConfig>,
}

/// Step definition as written in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepManifest {
    pub name: String,

    pub kind: StepKind,

    /// Registered agent name (agent steps)
    #[serde(default)]
    pub agent: Option<String>,

    /// Registered function name (function steps)
    #[serde(default)]
    pub function: Option<String>,
}

impl PipelineManifest {
    /// Load a pipeline manifest from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline manifest from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: PipelineManifest = serde_yaml::from_str(yaml)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest's structure
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            anyhow::bail!("Pipeline id must not be empty");
        }
        if self.steps.is_empty() {
            anyhow::bail!("Pipeline '{}' has no steps", self.id);
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                anyhow::bail!("Pipeline '{}' has a step with an empty name", self.id);
            }
            if !seen.insert(step.name.as_str()) {
                anyhow::bail!("Duplicate step name: {}", step.name);
            }
            match step.kind {
                StepKind::Agent if step.agent.is_none() => {
                    anyhow::bail!("Agent step '{}' does not name an agent", step.name);
                }
                StepKind::Function if step.function.is_none() => {
                    anyhow::bail!("Function step '{}' does not name a function", step.name);
                }
                _ => {}
            }
        }

        let step_agents: HashSet<&str> = self.steps.iter().filter_map(|s| s.agent.as_deref()).collect();
        for handoff in &self.handoffs {
            if handoff.source_agent.trim().is_empty() {
                anyhow::bail!("Handoff config has an empty source agent");
            }
            if handoff.allowed_targets.iter().any(|t| t == &handoff.source_agent) {
                anyhow::bail!("Agent '{}' may not hand off to itself", handoff.source_agent);
            }
            if !step_agents.contains(handoff.source_agent.as_str())
                && !self
                    .handoffs
                    .iter()
                    .any(|other| other.allowed_targets.contains(&handoff.source_agent))
            {
                tracing::warn!(
                    pipeline = %self.id,
                    source_agent = %handoff.source_agent,
                    "Handoff config refers to an agent no step can reach"
                );
            }
        }

        Ok(())
    }

    /// Agent names referenced by steps and handoff rules, sorted
    pub fn referenced_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self
            .steps
            .iter()
            .filter_map(|s| s.agent.clone())
            .chain(self.handoffs.iter().flat_map(|h| h.allowed_targets.iter().cloned()))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        agents.sort();
        agents
    }

    /// Build a runnable pipeline, resolving function steps against `functions`
    pub fn into_pipeline(self, functions: &FunctionRegistry) -> Result<PipelineConfig> {
        let mut pipeline = PipelineConfig::new(self.id);
        pipeline.checkpoint = self.checkpoint;
        pipeline.handoffs = self.handoffs;

        for step in self.steps {
            let built = match (step.kind, step.agent, step.function) {
                (StepKind::Agent, Some(agent), _) => Step::agent(step.name, agent),
                (StepKind::Function, _, Some(function)) => {
                    let f = functions.get(&function).with_context(|| {
                        format!("Unknown function '{}' for step '{}'", function, step.name)
                    })?;
                    Step::with_function(step.name, f)
                }
                (kind, _, _) => anyhow::bail!("Step '{}' is missing its {:?} target", step.name, kind),
            };
            pipeline.steps.push(built);
        }

        pipeline.validate()?;
        Ok(pipeline)
    }
}

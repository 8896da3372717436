use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::{
    aggregator::MetricsAggregator,
    config::{
        Config, EngineBootstrapConfig, EngineConfig, ForensicConfig, OrchestratorSettings,
    },
    engine::{EngineSupervisor, EventBus, InitializationError},
    executor::{EnvSecretProvider, ExecutorLimits, ProcessExecutor, SecretProvider},
    forensic::{ForensicLogger, ForensicSink, JsonlFileSink},
    orchestrator::{Inner, LifecycleState, Orchestrator},
    session::SessionStore,
    tracker::OperationTracker,
    types::TaskType,
    workflow::{WorkflowOverride, WorkflowOverrides, WorkflowRegistry},
};

/// Assembles an `Orchestrator` from config plus injected collaborators.
pub struct OrchestratorBuilder {
    settings: OrchestratorSettings,
    engine: EngineConfig,
    limits: ExecutorLimits,
    workflows: WorkflowOverrides,
    forensic: ForensicConfig,
    forensic_sink: Option<Arc<dyn ForensicSink>>,
    secret_provider: Option<Arc<dyn SecretProvider>>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            settings: config.orchestrator.clone(),
            engine: config.engine.clone(),
            limits: config.executor.clone(),
            workflows: config.workflows.clone(),
            forensic: config.forensic.clone(),
            forensic_sink: None,
            secret_provider: None,
        }
    }

    pub fn max_concurrent_operations(mut self, limit: usize) -> Self {
        self.settings.max_concurrent_operations = limit;
        self
    }

    pub fn persist_sessions(mut self, enabled: bool) -> Self {
        self.settings.persist_sessions = enabled;
        self
    }

    pub fn reasoner_program(mut self, program: impl Into<String>) -> Self {
        self.engine.reasoner_program = program.into();
        self
    }

    pub fn bootstrap(mut self, bootstrap: Option<EngineBootstrapConfig>) -> Self {
        self.engine.bootstrap = bootstrap;
        self
    }

    pub fn executor_limits(mut self, limits: ExecutorLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn workflow(mut self, task_type: TaskType, patch: WorkflowOverride) -> Self {
        self.workflows.insert(task_type, patch);
        self
    }

    /// Replaces the configured JSONL file with a custom sink.
    pub fn forensic_sink(mut self, sink: Arc<dyn ForensicSink>) -> Self {
        self.forensic.enabled = true;
        self.forensic_sink = Some(sink);
        self
    }

    pub fn disable_forensic(mut self) -> Self {
        self.forensic.enabled = false;
        self.forensic_sink = None;
        self
    }

    pub fn secret_provider(mut self, provider: Arc<dyn SecretProvider>) -> Self {
        self.secret_provider = Some(provider);
        self
    }

    /// Validates the workflow table and starts the forensic writer. Must be
    /// called inside a Tokio runtime when forensic logging is enabled.
    pub fn build(self) -> Result<Orchestrator, InitializationError> {
        let registry = WorkflowRegistry::with_builtins(&self.engine.reasoner_program, &self.workflows)?;

        let forensic = self.forensic.enabled.then(|| {
            let sink = self.forensic_sink.unwrap_or_else(|| {
                Arc::new(JsonlFileSink::new(self.forensic.path.clone())) as Arc<dyn ForensicSink>
            });
            ForensicLogger::spawn(sink, self.forensic.queue_capacity)
        });
        let secrets = self.secret_provider.unwrap_or_else(|| {
            Arc::new(EnvSecretProvider::new(self.engine.secret_env.clone())) as Arc<dyn SecretProvider>
        });

        tracing::debug!(
            target: "orchestrator",
            workflows = registry.len(),
            max_concurrent_operations = self.settings.max_concurrent_operations,
            forensic_enabled = forensic.is_some(),
            engine_bootstrap = self.engine.bootstrap.is_some(),
            "orchestrator_built"
        );

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                permits: Semaphore::new(self.settings.max_concurrent_operations.max(1)),
                events: Arc::new(EventBus::new(self.settings.event_capacity)),
                settings: self.settings,
                registry,
                executor: ProcessExecutor::new(self.limits),
                secrets,
                tracker: OperationTracker::new(),
                sessions: SessionStore::new(),
                metrics: MetricsAggregator::new(),
                forensic,
                engine: EngineSupervisor::new(self.engine.bootstrap),
                lifecycle: RwLock::new(LifecycleState::Created),
                lifecycle_gate: Mutex::new(()),
                shutdown: CancellationToken::new(),
            }),
        })
    }
}

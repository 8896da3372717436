//! Composition root: owns every shared table and wires admission, routing,
//! execution and recording together.

mod builder;
mod lifecycle;
mod operation;
mod report;

use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

pub use builder::OrchestratorBuilder;
pub use lifecycle::LifecycleState;
pub use operation::outcome_from_payload;
pub use report::MetricsReport;

use crate::{
    aggregator::MetricsAggregator,
    config::{Config, OrchestratorSettings},
    engine::{EngineSupervisor, EventBus, InitializationError, OrchestratorEvent},
    executor::{ProcessExecutor, SecretProvider},
    forensic::ForensicLogger,
    session::{Session, SessionStore},
    tracker::{OperationTracker, OperationView},
    workflow::WorkflowRegistry,
};

/// Cheap to clone; clones share one instance. Independent instances share
/// nothing, so tests can run several side by side.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    settings: OrchestratorSettings,
    registry: WorkflowRegistry,
    executor: ProcessExecutor,
    secrets: Arc<dyn SecretProvider>,
    tracker: OperationTracker,
    sessions: SessionStore,
    metrics: MetricsAggregator,
    forensic: Option<ForensicLogger>,
    permits: Semaphore,
    engine: EngineSupervisor,
    events: Arc<EventBus>,
    lifecycle: RwLock<LifecycleState>,
    lifecycle_gate: Mutex<()>,
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn from_config(config: &Config) -> Result<Self, InitializationError> {
        OrchestratorBuilder::from_config(config).build()
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.inner.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    /// Requests cancellation of an in-flight operation. Returns false when
    /// the id is not (or no longer) tracked.
    pub fn cancel(&self, operation_id: &str) -> bool {
        let cancelled = self.inner.tracker.cancel(operation_id);
        if cancelled {
            tracing::info!(
                target: "orchestrator",
                operation_id = %operation_id,
                "operation_cancel_requested"
            );
        }
        cancelled
    }

    pub fn get_metrics(&self) -> MetricsReport {
        MetricsReport::new(
            self.inner.metrics.snapshot(),
            self.inner.tracker.active_count(),
            self.inner.sessions.len(),
            self.inner
                .forensic
                .as_ref()
                .map_or(0, ForensicLogger::write_failures),
        )
    }

    pub fn active_operations(&self) -> Vec<OperationView> {
        self.inner.tracker.snapshot()
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.inner.sessions.get(session_id)
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.inner.sessions.snapshot()
    }

    pub fn evict_session(&self, session_id: &str) -> Option<Session> {
        let evicted = self.inner.sessions.evict(session_id);
        if evicted.is_some() {
            tracing::debug!(target: "orchestrator", session_id = %session_id, "session_evicted");
        }
        evicted
    }

    /// Resolves once every queued forensic entry has reached the sink.
    pub async fn flush_forensic(&self) {
        if let Some(forensic) = &self.inner.forensic {
            forensic.flush().await;
        }
    }
}

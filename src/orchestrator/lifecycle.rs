use serde::Serialize;

use crate::{
    engine::{InitializationError, OrchestratorEvent},
    orchestrator::Orchestrator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Built, not yet initialized. Submissions are rejected.
    Created,
    Ready,
    /// The last `initialize` failed; a later call may still succeed.
    Failed,
    ShutDown,
}

impl Orchestrator {
    pub fn lifecycle_state(&self) -> LifecycleState {
        *self.inner.lifecycle.read().expect("lock poisoned")
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle_state() == LifecycleState::Ready
    }

    /// Starts the reasoning engine (when configured) and opens admission.
    /// `Ready` is published only after the engine survived its grace period.
    /// Calling it again once ready does nothing.
    pub async fn initialize(&self) -> Result<(), InitializationError> {
        let _gate = self.inner.lifecycle_gate.lock().await;
        match self.lifecycle_state() {
            LifecycleState::Ready => return Ok(()),
            LifecycleState::ShutDown => return Err(InitializationError::ShutDown),
            LifecycleState::Created | LifecycleState::Failed => {}
        }

        match self.inner.engine.start(&self.inner.events).await {
            Ok(engine_pid) => {
                self.set_lifecycle(LifecycleState::Ready);
                tracing::info!(
                    target: "orchestrator",
                    engine_pid = ?engine_pid,
                    workflows = self.inner.registry.len(),
                    "orchestrator_ready"
                );
                self.inner
                    .events
                    .publish(OrchestratorEvent::Ready { engine_pid });
                Ok(())
            }
            Err(err) => {
                self.set_lifecycle(LifecycleState::Failed);
                tracing::error!(target: "orchestrator", error = %err, "orchestrator_initialize_failed");
                Err(err)
            }
        }
    }

    /// Cancels in-flight work, waits for it to be recorded, stops the engine
    /// and drains the forensic writer. Safe before `initialize` and safe to
    /// call twice.
    pub async fn shutdown(&self) {
        let _gate = self.inner.lifecycle_gate.lock().await;
        {
            let mut state = self.inner.lifecycle.write().expect("lock poisoned");
            if *state == LifecycleState::ShutDown {
                return;
            }
            *state = LifecycleState::ShutDown;
        }

        let in_flight = self.inner.tracker.active_count();
        tracing::info!(target: "orchestrator", in_flight = in_flight, "orchestrator_shutdown_started");

        self.inner.shutdown.cancel();
        self.inner.tracker.wait_idle().await;
        self.inner.engine.stop().await;
        if let Some(forensic) = &self.inner.forensic {
            forensic.close().await;
        }

        self.inner.events.publish(OrchestratorEvent::ShutdownComplete);
        self.inner.events.close();
        tracing::info!(target: "orchestrator", "orchestrator_shutdown_complete");
    }

    fn set_lifecycle(&self, next: LifecycleState) {
        *self.inner.lifecycle.write().expect("lock poisoned") = next;
    }
}

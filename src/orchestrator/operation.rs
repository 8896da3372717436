use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    aggregator::Outcome,
    engine::OrchestratorEvent,
    error::{self, OrchestrationError},
    forensic::AuditSubject,
    observability::metrics::{record_active_operations, record_operation},
    orchestrator::{Inner, LifecycleState, Orchestrator},
    tracker::{OperationLease, OperationStatus, generate_operation_id},
    types::{CognitiveTask, OperationId, OrchestrationResult, TaskRequest, TaskType},
};

impl Orchestrator {
    /// Runs one task to a terminal result. Task-level failures come back as
    /// `success: false`; this never returns an error.
    ///
    /// The operation runs on its own Tokio task, so dropping the returned
    /// future does not abandon bookkeeping for a process already started.
    pub async fn submit(&self, request: impl Into<TaskRequest>) -> OrchestrationResult {
        let request = request.into();
        let admitted_at = Instant::now();

        let lease = match self.admit(&request) {
            Ok(lease) => lease,
            Err(err) => return self.inner.reject(&request, err, admitted_at.elapsed()),
        };

        let operation_id = lease.operation_id().to_string();
        let task = Arc::clone(lease.task());
        record_active_operations(self.inner.tracker.active_count());

        let inner = Arc::clone(&self.inner);
        match tokio::spawn(inner.run_operation(lease)).await {
            Ok(result) => result,
            Err(join_err) => {
                tracing::error!(
                    target: "orchestrator",
                    operation_id = %operation_id,
                    error = %join_err,
                    "operation_task_failed"
                );
                let err = error::internal_error(format!("operation task failed: {join_err}"));
                let elapsed = admitted_at.elapsed();
                let result =
                    OrchestrationResult::failure(Some(operation_id.clone()), &err, millis(elapsed));
                self.inner
                    .record_terminal(&operation_id, &AuditSubject::from(task.as_ref()), &result, elapsed);
                result
            }
        }
    }

    /// Validates the request and registers it with the tracker while holding
    /// the lifecycle read lock, so `shutdown` always sees it as in flight.
    fn admit(&self, request: &TaskRequest) -> Result<OperationLease, OrchestrationError> {
        let lifecycle = self.inner.lifecycle.read().expect("lock poisoned");
        if *lifecycle != LifecycleState::Ready {
            return Err(error::not_ready(format!(
                "orchestrator is {}",
                lifecycle_label(*lifecycle)
            )));
        }

        let task = CognitiveTask::from_request(request)?;
        Ok(self
            .inner
            .tracker
            .begin(Arc::new(task), &self.inner.shutdown))
    }
}

impl Inner {
    #[tracing::instrument(
        name = "orchestrator_operation",
        target = "orchestrator",
        skip_all,
        fields(
            operation_id = %lease.operation_id(),
            task_type = %lease.task().task_type,
        )
    )]
    async fn run_operation(self: Arc<Self>, lease: OperationLease) -> OrchestrationResult {
        let operation_id = lease.operation_id().to_string();
        let task = Arc::clone(lease.task());
        let cancel = lease.cancellation();

        self.events.publish(OrchestratorEvent::OperationStarted {
            operation_id: operation_id.clone(),
            task_type: task.task_type.as_str().to_string(),
        });

        let outcome = self.execute(&operation_id, &task, &cancel).await;
        let elapsed = lease.elapsed();
        let result = match outcome {
            Ok(mut result) => {
                result.operation_id = Some(operation_id.clone());
                result.duration_ms = millis(elapsed);
                result
            }
            Err(err) => {
                tracing::warn!(
                    target: "orchestrator",
                    error_kind = %err.kind,
                    error = %err.message,
                    "operation_failed"
                );
                OrchestrationResult::failure(Some(operation_id.clone()), &err, millis(elapsed))
            }
        };

        self.record_terminal(&operation_id, &AuditSubject::from(task.as_ref()), &result, elapsed);
        let status = if result.success {
            OperationStatus::Completed
        } else {
            OperationStatus::Failed
        };
        lease.finish(status);
        record_active_operations(self.tracker.active_count());

        tracing::info!(
            target: "orchestrator",
            success = result.success,
            duration_ms = result.duration_ms,
            model_used = ?result.model_used,
            session_id = ?result.session_id,
            "operation_finished"
        );
        self.events.publish(OrchestratorEvent::OperationFinished {
            operation_id,
            success: result.success,
            duration_ms: result.duration_ms,
        });
        result
    }

    async fn execute(
        &self,
        operation_id: &str,
        task: &CognitiveTask,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationResult, OrchestrationError> {
        let handler = self
            .registry
            .resolve(task.task_type)
            .map_err(|err| error::unknown_task_type(err.to_string()))?;

        if let Some(session_id) = task.session_hint()
            && self.sessions.touch(session_id)
        {
            tracing::debug!(target: "orchestrator", session_id = %session_id, "session_reused");
        }

        let invocation = handler.prepare(operation_id, task);
        let timeout = self.executor.limits().effective_timeout(invocation.timeout_ms);

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(error::cancelled("operation cancelled while waiting for a process slot"));
            }
            permit = self.permits.acquire() => permit
                .map_err(|_| error::internal_error("process slot limiter is closed"))?,
        };

        let secrets = self.secrets.resolve().await;
        let execution = self
            .executor
            .execute_with_cancel(
                &invocation.script,
                &invocation.payload,
                &secrets,
                timeout,
                cancel,
            )
            .await?;

        if execution.stdout_truncated || execution.stderr_truncated {
            tracing::warn!(
                target: "orchestrator",
                stdout_truncated = execution.stdout_truncated,
                stderr_truncated = execution.stderr_truncated,
                "process_output_truncated"
            );
        }

        let result = outcome_from_payload(execution.payload, execution.parsing_error);
        if invocation.persist_session
            && self.settings.persist_sessions
            && let Some(session_id) = result.session_id.as_deref()
        {
            let touch = self.sessions.touch_or_insert(session_id, task);
            tracing::debug!(
                target: "orchestrator",
                session_id = %session_id,
                touch = ?touch,
                "session_recorded"
            );
        }

        Ok(result)
    }

    /// Failures before tracking still count as one terminal operation.
    fn reject(
        &self,
        request: &TaskRequest,
        err: OrchestrationError,
        elapsed: Duration,
    ) -> OrchestrationResult {
        let operation_id = generate_operation_id();
        tracing::warn!(
            target: "orchestrator",
            operation_id = %operation_id,
            task_type = %request.task_type,
            error_kind = %err.kind,
            error = %err.message,
            "submission_rejected"
        );

        let result = OrchestrationResult::failure(Some(operation_id.clone()), &err, millis(elapsed));
        self.record_terminal(&operation_id, &AuditSubject::from(request), &result, elapsed);
        result
    }

    fn record_terminal(
        &self,
        operation_id: &OperationId,
        subject: &AuditSubject,
        result: &OrchestrationResult,
        elapsed: Duration,
    ) {
        let outcome = Outcome::from_success(result.success);
        let task_type = subject.task_type.parse::<TaskType>().ok();
        self.metrics
            .record(task_type, elapsed, outcome, result.model_used.as_deref());
        record_operation(outcome, elapsed);
        if let Some(forensic) = &self.forensic {
            forensic.log(operation_id, subject, result, elapsed);
        }
    }
}

/// Maps the reasoning process's stdout object onto a successful result.
/// The whole object becomes `result`; known fields are lifted out.
pub fn outcome_from_payload(payload: Value, parsing_error: Option<String>) -> OrchestrationResult {
    let text_field = |name: &str| {
        payload
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    OrchestrationResult {
        success: true,
        session_id: text_field("session_id"),
        model_used: text_field("model_used"),
        token_usage: payload
            .get("token_usage")
            .filter(|value| !value.is_null())
            .cloned(),
        reasoning_steps: payload
            .get("reasoning_steps")
            .and_then(Value::as_array)
            .cloned(),
        parsing_error,
        result: Some(payload),
        ..OrchestrationResult::default()
    }
}

fn lifecycle_label(state: LifecycleState) -> &'static str {
    match state {
        LifecycleState::Created => "not initialized",
        LifecycleState::Ready => "ready",
        LifecycleState::Failed => "not initialized (last initialize failed)",
        LifecycleState::ShutDown => "shut down",
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

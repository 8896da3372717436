use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::{CognitiveTask, OperationId, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
struct Operation {
    task: Arc<CognitiveTask>,
    started_at: Instant,
    status: OperationStatus,
    cancel: CancellationToken,
}

/// Read-only view of an in-flight operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationView {
    pub operation_id: OperationId,
    pub task_id: String,
    pub task_type: TaskType,
    pub status: OperationStatus,
    pub age_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CompletedOperation {
    pub operation_id: OperationId,
    pub task: Arc<CognitiveTask>,
    pub status: OperationStatus,
    pub duration: Duration,
}

#[derive(Default)]
struct TrackerShared {
    operations: Mutex<HashMap<OperationId, Operation>>,
    idle: Notify,
}

/// Owns every in-flight operation. Entries leave only through
/// `OperationLease`, either `finish` or its `Drop`.
#[derive(Clone, Default)]
pub struct OperationTracker {
    shared: Arc<TrackerShared>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the task before anything is spawned for it. The lease's
    /// cancellation token is a child of `parent`.
    pub fn begin(&self, task: Arc<CognitiveTask>, parent: &CancellationToken) -> OperationLease {
        let cancel = parent.child_token();
        let started_at = Instant::now();
        let mut operations = self.shared.operations.lock().expect("lock poisoned");

        let mut operation_id = generate_operation_id();
        while operations.contains_key(&operation_id) {
            operation_id = generate_operation_id();
        }

        operations.insert(
            operation_id.clone(),
            Operation {
                task: Arc::clone(&task),
                started_at,
                status: OperationStatus::Processing,
                cancel: cancel.clone(),
            },
        );
        drop(operations);

        OperationLease {
            tracker: self.clone(),
            operation_id,
            task,
            started_at,
            cancel,
            finished: false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.shared.operations.lock().expect("lock poisoned").len()
    }

    pub fn contains(&self, operation_id: &str) -> bool {
        self.shared
            .operations
            .lock()
            .expect("lock poisoned")
            .contains_key(operation_id)
    }

    pub fn cancel(&self, operation_id: &str) -> bool {
        let operations = self.shared.operations.lock().expect("lock poisoned");
        match operations.get(operation_id) {
            Some(operation) => {
                operation.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<OperationView> {
        let operations = self.shared.operations.lock().expect("lock poisoned");
        let mut views: Vec<OperationView> = operations
            .iter()
            .map(|(operation_id, operation)| OperationView {
                operation_id: operation_id.clone(),
                task_id: operation.task.id.clone(),
                task_type: operation.task.task_type,
                status: operation.status,
                age_ms: operation.started_at.elapsed().as_millis() as u64,
            })
            .collect();
        views.sort_by(|lhs, rhs| rhs.age_ms.cmp(&lhs.age_ms));
        views
    }

    /// Resolves once no operation is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn end(&self, operation_id: &str, status: OperationStatus) -> Option<Duration> {
        let mut operations = self.shared.operations.lock().expect("lock poisoned");
        let removed = operations.remove(operation_id).map(|mut operation| {
            operation.status = status;
            operation.started_at.elapsed()
        });
        let now_idle = operations.is_empty();
        drop(operations);

        if now_idle {
            self.shared.idle.notify_waiters();
        }
        removed
    }
}

/// Exclusive handle on one tracked operation. Dropping it without calling
/// `finish` (panic, aborted task) still removes the entry.
pub struct OperationLease {
    tracker: OperationTracker,
    operation_id: OperationId,
    task: Arc<CognitiveTask>,
    started_at: Instant,
    cancel: CancellationToken,
    finished: bool,
}

impl OperationLease {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn task(&self) -> &Arc<CognitiveTask> {
        &self.task
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn finish(mut self, status: OperationStatus) -> CompletedOperation {
        self.finished = true;
        let duration = self
            .tracker
            .end(&self.operation_id, status)
            .unwrap_or_else(|| self.started_at.elapsed());

        CompletedOperation {
            operation_id: self.operation_id.clone(),
            task: Arc::clone(&self.task),
            status,
            duration,
        }
    }
}

impl Drop for OperationLease {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self
            .tracker
            .end(&self.operation_id, OperationStatus::Failed)
            .is_some()
        {
            tracing::warn!(
                target: "orchestrator",
                operation_id = %self.operation_id,
                "operation_lease_abandoned"
            );
        }
    }
}

/// Time-ordered and random in its low bits (UUIDv7).
pub fn generate_operation_id() -> OperationId {
    format!("op-{}", Uuid::now_v7())
}

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::OperationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStream {
    Stdout,
    Stderr,
}

impl EngineStream {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Lifecycle notifications published by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    Ready {
        engine_pid: Option<u32>,
    },
    OperationStarted {
        operation_id: OperationId,
        task_type: String,
    },
    OperationFinished {
        operation_id: OperationId,
        success: bool,
        duration_ms: u64,
    },
    EngineOutput {
        stream: EngineStream,
        line: String,
    },
    EngineExited {
        exit_code: Option<i32>,
    },
    ShutdownComplete,
}

/// Broadcast fan-out that can be closed exactly once. Publishing with no
/// subscribers, or after close, is a no-op.
#[derive(Debug)]
pub struct EventBus {
    sender: Mutex<Option<broadcast::Sender<OrchestratorEvent>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    pub fn publish(&self, event: OrchestratorEvent) {
        let sender = self.sender.lock().expect("lock poisoned");
        if let Some(sender) = sender.as_ref() {
            let _ = sender.send(event);
        }
    }

    /// Subscribing after close yields a receiver that reports `Closed`
    /// immediately.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        let sender = self.sender.lock().expect("lock poisoned");
        match sender.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (closed, receiver) = broadcast::channel(1);
                drop(closed);
                receiver
            }
        }
    }

    pub fn close(&self) {
        self.sender.lock().expect("lock poisoned").take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().expect("lock poisoned").is_none()
    }
}

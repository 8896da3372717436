use std::{io, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{CognitiveTask, OperationId, Priority, SessionId, TaskRequest};

/// One append-only audit record per terminal operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForensicEntry {
    pub operation_id: OperationId,
    pub timestamp: String,
    pub task_type: String,
    pub priority: Priority,
    pub models_used: Vec<String>,
    pub session_id: Option<SessionId>,
    pub success: bool,
    pub duration_ms: u64,
    pub data_hash: String,
    pub chain_of_custody: String,
}

/// The task facts recorded in an entry. Rejected submissions have no
/// validated task, so this is built from either form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSubject {
    pub task_type: String,
    pub priority: Priority,
    pub models: Vec<String>,
}

impl From<&CognitiveTask> for AuditSubject {
    fn from(task: &CognitiveTask) -> Self {
        Self {
            task_type: task.task_type.as_str().to_string(),
            priority: task.priority,
            models: task.models.clone(),
        }
    }
}

impl From<&TaskRequest> for AuditSubject {
    fn from(request: &TaskRequest) -> Self {
        Self {
            task_type: request.task_type.clone(),
            priority: request.priority,
            models: request.models.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ForensicWriteError {
    #[error("failed to write forensic log '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode forensic entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("forensic queue is full")]
    QueueFull,
    #[error("forensic writer is closed")]
    Closed,
    #[error("forensic sink unavailable: {0}")]
    Unavailable(String),
}

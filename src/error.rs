use std::fmt;

use serde::{Deserialize, Serialize};

use crate::executor::ExecutionError;

/// Task-level failure categories. These never escape `Orchestrator::submit`;
/// they are folded into the returned `OrchestrationResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestrationErrorKind {
    #[serde(rename = "UnknownTaskType")]
    UnknownTaskType,
    #[serde(rename = "NotReady")]
    NotReady,
    #[serde(rename = "ProcessSpawnError")]
    ProcessSpawn,
    #[serde(rename = "ProcessExecutionError")]
    ProcessExecution,
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "CancelledError")]
    Cancelled,
    #[serde(rename = "InternalError")]
    Internal,
}

impl OrchestrationErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::UnknownTaskType => "UnknownTaskType",
            Self::NotReady => "NotReady",
            Self::ProcessSpawn => "ProcessSpawnError",
            Self::ProcessExecution => "ProcessExecutionError",
            Self::Timeout => "TimeoutError",
            Self::Cancelled => "CancelledError",
            Self::Internal => "InternalError",
        }
    }
}

impl fmt::Display for OrchestrationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationError {
    pub kind: OrchestrationErrorKind,
    pub message: String,
}

impl OrchestrationError {
    pub fn new(kind: OrchestrationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for OrchestrationError {}

impl From<ExecutionError> for OrchestrationError {
    fn from(err: ExecutionError) -> Self {
        let kind = match &err {
            ExecutionError::Spawn { .. } | ExecutionError::Payload(_) => {
                OrchestrationErrorKind::ProcessSpawn
            }
            ExecutionError::NonZeroExit { .. } | ExecutionError::Wait(_) => {
                OrchestrationErrorKind::ProcessExecution
            }
            ExecutionError::Timeout { .. } => OrchestrationErrorKind::Timeout,
            ExecutionError::Cancelled { .. } => OrchestrationErrorKind::Cancelled,
        };
        Self::new(kind, err.to_string())
    }
}

pub fn unknown_task_type(message: impl Into<String>) -> OrchestrationError {
    OrchestrationError::new(OrchestrationErrorKind::UnknownTaskType, message)
}

pub fn not_ready(message: impl Into<String>) -> OrchestrationError {
    OrchestrationError::new(OrchestrationErrorKind::NotReady, message)
}

pub fn cancelled(message: impl Into<String>) -> OrchestrationError {
    OrchestrationError::new(OrchestrationErrorKind::Cancelled, message)
}

pub fn internal_error(message: impl Into<String>) -> OrchestrationError {
    OrchestrationError::new(OrchestrationErrorKind::Internal, message)
}

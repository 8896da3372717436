use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{OrchestrationError, OrchestrationErrorKind, unknown_task_type};

pub type OperationId = String;
pub type SessionId = String;
pub type TaskContext = BTreeMap<String, Value>;

/// Context key a caller uses to continue an existing session.
pub const SESSION_CONTEXT_KEY: &str = "session_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Research,
    Analysis,
    CodeGeneration,
    LegalReasoning,
    CrossPlatformSync,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::Research,
        TaskType::Analysis,
        TaskType::CodeGeneration,
        TaskType::LegalReasoning,
        TaskType::CrossPlatformSync,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Analysis => "analysis",
            Self::CodeGeneration => "code_generation",
            Self::LegalReasoning => "legal_reasoning",
            Self::CrossPlatformSync => "cross_platform_sync",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = OrchestrationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        TaskType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
            .ok_or_else(|| unknown_task_type(format!("task type '{raw}' is not declared")))
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutput {
    #[default]
    Structured,
    Streaming,
    Batch,
}

/// Wire form of a submission. `task_type` stays a raw string so that
/// undeclared types can reach admission and be rejected there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", alias = "task_type")]
    pub task_type: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub context: TaskContext,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub expected_output: ExpectedOutput,
}

impl TaskRequest {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            id: None,
            task_type: task_type.into(),
            priority: Priority::default(),
            context: TaskContext::new(),
            models: Vec::new(),
            tools: Vec::new(),
            expected_output: ExpectedOutput::default(),
        }
    }
}

/// A validated task. Immutable once submitted; the orchestrator shares it
/// behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveTask {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub priority: Priority,
    pub context: TaskContext,
    pub models: Vec<String>,
    pub tools: Vec<String>,
    pub expected_output: ExpectedOutput,
}

impl CognitiveTask {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            task_type,
            priority: Priority::default(),
            context: TaskContext::new(),
            models: Vec::new(),
            tools: Vec::new(),
            expected_output: ExpectedOutput::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_request(request: &TaskRequest) -> Result<Self, OrchestrationError> {
        let task_type = request.task_type.parse::<TaskType>()?;
        let id = request
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        Ok(Self {
            id,
            task_type,
            priority: request.priority,
            context: request.context.clone(),
            models: request.models.clone(),
            tools: request.tools.clone(),
            expected_output: request.expected_output,
        })
    }

    pub fn session_hint(&self) -> Option<&str> {
        self.context
            .get(SESSION_CONTEXT_KEY)
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
    }
}

impl TryFrom<TaskRequest> for CognitiveTask {
    type Error = OrchestrationError;

    fn try_from(request: TaskRequest) -> Result<Self, Self::Error> {
        Self::from_request(&request)
    }
}

impl From<CognitiveTask> for TaskRequest {
    fn from(task: CognitiveTask) -> Self {
        Self {
            id: Some(task.id),
            task_type: task.task_type.as_str().to_string(),
            priority: task.priority,
            context: task.context,
            models: task.models,
            tools: task.tools,
            expected_output: task.expected_output,
        }
    }
}

/// What every `submit` call returns. Task-level failures are reported here
/// with `success: false`, never as an `Err`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<OperationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<OrchestrationErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_steps: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsing_error: Option<String>,
    pub duration_ms: u64,
}

impl OrchestrationResult {
    pub fn failure(
        operation_id: Option<OperationId>,
        err: &OrchestrationError,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: false,
            operation_id,
            error: Some(err.to_string()),
            error_kind: Some(err.kind),
            duration_ms,
            ..Self::default()
        }
    }
}

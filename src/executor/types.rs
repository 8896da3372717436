use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical JSON task payload handed to the reasoning process.
pub const TASK_PAYLOAD_ENV: &str = "NOESIS_TASK_PAYLOAD";
pub const OPERATION_ID_ENV: &str = "NOESIS_OPERATION_ID";
pub const WORKFLOW_ENV: &str = "NOESIS_WORKFLOW";

/// A fully resolved process invocation. Never carries secrets; those are
/// merged into the environment at spawn time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl ScriptSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorLimits {
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub stdout_max_bytes: usize,
    pub stderr_max_bytes: usize,
}

impl Default for ExecutorLimits {
    fn default() -> Self {
        Self {
            default_timeout_ms: 120_000,
            max_timeout_ms: 600_000,
            stdout_max_bytes: 1024 * 1024,
            stderr_max_bytes: 64 * 1024,
        }
    }
}

impl ExecutorLimits {
    pub fn effective_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let timeout_ms = requested_ms
            .unwrap_or(self.default_timeout_ms)
            .min(self.max_timeout_ms)
            .max(1);
        Duration::from_millis(timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub payload: Value,
    pub parsing_error: Option<String>,
    pub exit_code: i32,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub elapsed: Duration,
}

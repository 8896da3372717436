use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::TaskType;

/// Versioned, data-only description of how a task type is executed. The
/// reasoning process interprets `parameters`; nothing here is executable
/// source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub persist_session: bool,
}

/// Config-side patch applied over a built-in template. `parameters` are
/// merged key by key; every other present field replaces the built-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowOverride {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub models: Option<Vec<String>>,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub persist_session: Option<bool>,
}

impl WorkflowTemplate {
    pub fn apply_override(&mut self, patch: &WorkflowOverride) {
        if let Some(program) = &patch.program {
            self.program = Some(program.clone());
        }
        if let Some(args) = &patch.args {
            self.args = args.clone();
        }
        if let Some(models) = &patch.models {
            self.models = models.clone();
        }
        if let Some(tools) = &patch.tools {
            self.tools = tools.clone();
        }
        if let Some(timeout_ms) = patch.timeout_ms {
            self.timeout_ms = Some(timeout_ms);
        }
        for (key, value) in &patch.parameters {
            self.parameters.insert(key.clone(), value.clone());
        }
        if let Some(persist_session) = patch.persist_session {
            self.persist_session = persist_session;
        }
    }
}

pub type WorkflowOverrides = BTreeMap<TaskType, WorkflowOverride>;

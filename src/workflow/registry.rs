use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::{
    executor::{OPERATION_ID_ENV, ScriptSpec, WORKFLOW_ENV},
    types::{CognitiveTask, TaskType},
    workflow::{
        builtin::builtin_templates,
        types::{WorkflowOverrides, WorkflowTemplate},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("workflow table is missing task types: {}", join_task_types(.missing))]
    Incomplete { missing: Vec<TaskType> },
    #[error("workflow '{task_type}' resolves to an empty program")]
    EmptyProgram { task_type: TaskType },
    #[error("no workflow is registered for task type '{0}'")]
    UnknownTaskType(String),
}

fn join_task_types(task_types: &[TaskType]) -> String {
    task_types
        .iter()
        .map(|task_type| task_type.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Everything the executor needs for one operation of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowInvocation {
    pub script: ScriptSpec,
    pub payload: Value,
    pub timeout_ms: Option<u64>,
    pub models: Vec<String>,
    pub tools: Vec<String>,
    pub persist_session: bool,
}

#[derive(Debug, Clone)]
pub struct WorkflowHandler {
    task_type: TaskType,
    template: WorkflowTemplate,
    program: String,
}

impl WorkflowHandler {
    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn template(&self) -> &WorkflowTemplate {
        &self.template
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Task-supplied models and tools win over the template defaults.
    pub fn prepare(&self, operation_id: &str, task: &CognitiveTask) -> WorkflowInvocation {
        let models = if task.models.is_empty() {
            self.template.models.clone()
        } else {
            task.models.clone()
        };
        let tools = if task.tools.is_empty() {
            self.template.tools.clone()
        } else {
            task.tools.clone()
        };

        let payload = json!({
            "operation_id": operation_id,
            "task_id": task.id,
            "task_type": task.task_type,
            "priority": task.priority,
            "expected_output": task.expected_output,
            "context": task.context,
            "models": models,
            "tools": tools,
            "workflow": {
                "name": self.template.name,
                "version": self.template.version,
                "parameters": self.template.parameters,
            },
        });

        let script = ScriptSpec::new(self.program.clone())
            .args(self.template.args.iter().cloned())
            .env(OPERATION_ID_ENV, operation_id)
            .env(WORKFLOW_ENV, self.template.name.clone());

        WorkflowInvocation {
            script,
            payload,
            timeout_ms: self.template.timeout_ms,
            models,
            tools,
            persist_session: self.template.persist_session,
        }
    }
}

/// Static routing table from task type to handler, fixed at construction.
#[derive(Debug, Clone)]
pub struct WorkflowRegistry {
    handlers: BTreeMap<TaskType, WorkflowHandler>,
}

impl WorkflowRegistry {
    /// Fails unless every declared `TaskType` has a template.
    pub fn new(
        templates: BTreeMap<TaskType, WorkflowTemplate>,
        default_program: &str,
    ) -> Result<Self, RegistryError> {
        let missing: Vec<TaskType> = TaskType::ALL
            .into_iter()
            .filter(|task_type| !templates.contains_key(task_type))
            .collect();
        if !missing.is_empty() {
            return Err(RegistryError::Incomplete { missing });
        }

        let mut handlers = BTreeMap::new();
        for (task_type, template) in templates {
            let program = template
                .program
                .clone()
                .unwrap_or_else(|| default_program.to_string());
            if program.trim().is_empty() {
                return Err(RegistryError::EmptyProgram { task_type });
            }
            handlers.insert(
                task_type,
                WorkflowHandler {
                    task_type,
                    template,
                    program,
                },
            );
        }

        Ok(Self { handlers })
    }

    pub fn with_builtins(
        default_program: &str,
        overrides: &WorkflowOverrides,
    ) -> Result<Self, RegistryError> {
        let mut templates = builtin_templates();
        for (task_type, patch) in overrides {
            if let Some(template) = templates.get_mut(task_type) {
                template.apply_override(patch);
            }
        }
        Self::new(templates, default_program)
    }

    pub fn resolve(&self, task_type: TaskType) -> Result<&WorkflowHandler, RegistryError> {
        self.handlers
            .get(&task_type)
            .ok_or_else(|| RegistryError::UnknownTaskType(task_type.as_str().to_string()))
    }

    pub fn resolve_name(&self, raw: &str) -> Result<&WorkflowHandler, RegistryError> {
        let task_type = raw
            .parse::<TaskType>()
            .map_err(|_| RegistryError::UnknownTaskType(raw.to_string()))?;
        self.resolve(task_type)
    }

    pub fn task_types(&self) -> impl Iterator<Item = TaskType> + '_ {
        self.handlers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

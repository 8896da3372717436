use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::{types::TaskType, workflow::types::WorkflowTemplate};

pub const BUILTIN_TEMPLATE_VERSION: u32 = 1;

/// The shipped template for each task type. The match is exhaustive, so a
/// new `TaskType` variant does not compile without a template.
pub fn builtin_template(task_type: TaskType) -> WorkflowTemplate {
    match task_type {
        TaskType::Research => template(
            task_type,
            &["web_search", "document_reader", "citation_tracker"],
            300_000,
            json!({ "depth": "comprehensive", "max_sources": 20 }),
            true,
        ),
        TaskType::Analysis => template(
            task_type,
            &["data_profiler", "statistics"],
            180_000,
            json!({ "confidence_threshold": 0.8 }),
            true,
        ),
        TaskType::CodeGeneration => template(
            task_type,
            &["repository_reader", "test_runner", "linter"],
            300_000,
            json!({ "include_tests": true }),
            true,
        ),
        TaskType::LegalReasoning => template(
            task_type,
            &["case_law_search", "citation_validator"],
            600_000,
            json!({ "citation_required": true, "jurisdiction_aware": true }),
            true,
        ),
        TaskType::CrossPlatformSync => template(
            task_type,
            &["workspace_writer", "repository_metrics"],
            120_000,
            json!({ "conflict_strategy": "latest_wins" }),
            false,
        ),
    }
}

pub fn builtin_templates() -> BTreeMap<TaskType, WorkflowTemplate> {
    TaskType::ALL
        .into_iter()
        .map(|task_type| (task_type, builtin_template(task_type)))
        .collect()
}

fn template(
    task_type: TaskType,
    tools: &[&str],
    timeout_ms: u64,
    parameters: Value,
    persist_session: bool,
) -> WorkflowTemplate {
    let parameters = match parameters {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    };

    WorkflowTemplate {
        name: task_type.as_str().to_string(),
        version: BUILTIN_TEMPLATE_VERSION,
        program: None,
        args: vec![
            "--workflow".to_string(),
            task_type.as_str().to_string(),
            "--template-version".to_string(),
            BUILTIN_TEMPLATE_VERSION.to_string(),
        ],
        models: Vec::new(),
        tools: tools.iter().map(|tool| tool.to_string()).collect(),
        timeout_ms: Some(timeout_ms),
        parameters,
        persist_session,
    }
}

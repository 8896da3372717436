use std::{path::PathBuf, sync::Arc, time::Duration};

use serde_json::json;
use uuid::Uuid;

use noesis::{
    config::Config,
    forensic::{
        AuditSubject, ForensicLogger, JsonlFileSink, MemoryForensicSink, data_hash, load_entries,
    },
    orchestrator::OrchestratorBuilder,
    types::{CognitiveTask, OrchestrationResult, Priority, TaskType},
    workflow::WorkflowOverride,
};

fn trail_path() -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("noesis-forensic-test-{}", Uuid::now_v7()));
    let path = dir.join("nested/forensic.jsonl");
    (dir, path)
}

#[tokio::test]
async fn given_completed_operations_when_shutdown_then_jsonl_trail_holds_one_entry_each() {
    let (dir, path) = trail_path();
    let mut config = Config::default();
    config.forensic.path = path.clone();
    config.workflows.insert(
        TaskType::LegalReasoning,
        WorkflowOverride {
            program: Some("/bin/sh".to_string()),
            args: Some(vec![
                "-c".to_string(),
                r#"printf '{"session_id":"case-7","model_used":"gpt","verdict":"liable"}'"#
                    .to_string(),
            ]),
            ..WorkflowOverride::default()
        },
    );

    let orchestrator = OrchestratorBuilder::from_config(&config)
        .build()
        .expect("orchestrator should build");
    orchestrator.initialize().await.expect("initialize");

    let task = CognitiveTask::new(TaskType::LegalReasoning)
        .with_priority(Priority::High)
        .with_models(["reasoner-large"]);
    let first = orchestrator.submit(task.clone()).await;
    let second = orchestrator.submit(task).await;
    assert!(first.success && second.success);
    orchestrator.shutdown().await;

    let entries = load_entries(&path).expect("trail should be readable");
    assert_eq!(entries.len(), 2);

    let entry = entries
        .iter()
        .find(|entry| Some(&entry.operation_id) == first.operation_id.as_ref())
        .expect("entry for first operation");
    assert_eq!(entry.task_type, "legal_reasoning");
    assert_eq!(entry.priority, Priority::High);
    assert_eq!(
        entry.models_used,
        vec!["reasoner-large".to_string(), "gpt".to_string()]
    );
    assert_eq!(entry.session_id.as_deref(), Some("case-7"));
    assert!(entry.success);
    assert_eq!(entry.data_hash, data_hash(&first));
    assert!(entry.chain_of_custody.contains(&entry.operation_id));
    assert!(entry.chain_of_custody.ends_with(&entry.timestamp));
    assert_ne!(entries[0].operation_id, entries[1].operation_id);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn given_missing_trail_when_loaded_then_it_is_empty() {
    let (dir, path) = trail_path();
    assert!(load_entries(&path).expect("missing file is fine").is_empty());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn given_logger_when_closed_then_queued_entries_are_drained_and_later_ones_counted() {
    let sink = Arc::new(MemoryForensicSink::new());
    let logger = ForensicLogger::spawn(sink.clone(), 16);
    let subject = AuditSubject {
        task_type: "analysis".to_string(),
        priority: Priority::Low,
        models: Vec::new(),
    };
    let outcome = OrchestrationResult {
        success: true,
        result: Some(json!({"rows": 3})),
        ..OrchestrationResult::default()
    };

    for index in 0..5 {
        logger.log(
            &format!("op-{index}"),
            &subject,
            &outcome,
            Duration::from_millis(index),
        );
    }
    logger.close().await;
    logger.close().await;

    let entries = sink.entries();
    assert_eq!(entries.len(), 5);
    let ids: Vec<_> = entries.iter().map(|entry| entry.operation_id.as_str()).collect();
    assert_eq!(ids, vec!["op-0", "op-1", "op-2", "op-3", "op-4"]);
    assert_eq!(logger.write_failures(), 0);

    logger.log("op-late", &subject, &outcome, Duration::ZERO);
    assert_eq!(logger.write_failures(), 1);
    assert_eq!(sink.entries().len(), 5);
}

#[tokio::test]
async fn given_file_sink_in_unwritable_location_when_logged_then_failure_is_counted() {
    let blocker = std::env::temp_dir().join(format!("noesis-forensic-blocker-{}", Uuid::now_v7()));
    std::fs::write(&blocker, "not a directory").expect("blocker file should be written");

    let logger = ForensicLogger::spawn(Arc::new(JsonlFileSink::new(blocker.join("trail.jsonl"))), 4);
    let subject = AuditSubject {
        task_type: "research".to_string(),
        priority: Priority::Medium,
        models: Vec::new(),
    };
    logger.log(
        "op-1",
        &subject,
        &OrchestrationResult::default(),
        Duration::ZERO,
    );
    logger.flush().await;

    assert_eq!(logger.write_failures(), 1);
    logger.close().await;
    let _ = std::fs::remove_file(&blocker);
}

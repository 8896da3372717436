use serde_json::json;

use noesis::types::{CognitiveTask, TaskType};

use crate::support::{ready_orchestrator, shell_builder};

const SESSION_SCRIPT: &str = r#"printf '{"success":true,"session_id":"s1","model_used":"gpt"}'"#;

#[tokio::test]
async fn given_result_with_session_id_when_submitted_then_session_and_model_usage_are_recorded() {
    let (orchestrator, _sink) = ready_orchestrator(SESSION_SCRIPT).await;

    let task = CognitiveTask::new(TaskType::Research)
        .with_context("topic", json!("fusion"))
        .with_models(["reasoner-large"]);
    let result = orchestrator.submit(task).await;

    assert!(result.success);
    assert_eq!(result.session_id.as_deref(), Some("s1"));
    assert_eq!(result.model_used.as_deref(), Some("gpt"));

    let session = orchestrator.session("s1").expect("session s1 should exist");
    assert_eq!(session.task_type, TaskType::Research);
    assert_eq!(session.context.get("topic"), Some(&json!("fusion")));
    assert_eq!(session.models, vec!["reasoner-large".to_string()]);

    let metrics = orchestrator.get_metrics();
    assert_eq!(metrics.model_usage_stats.get("gpt"), Some(&1));
    assert_eq!(metrics.session_count, 1);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn given_existing_session_when_reused_then_it_is_refreshed_not_replaced() {
    let (orchestrator, _sink) = ready_orchestrator(SESSION_SCRIPT).await;

    orchestrator
        .submit(CognitiveTask::new(TaskType::Research).with_context("topic", json!("fusion")))
        .await;
    let first = orchestrator.session("s1").expect("session created");

    orchestrator
        .submit(CognitiveTask::new(TaskType::Analysis).with_context("session_id", json!("s1")))
        .await;
    let second = orchestrator.session("s1").expect("session kept");

    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.task_type, TaskType::Research);
    assert!(second.access_count > first.access_count);
    assert!(second.last_accessed_at >= first.last_accessed_at);
    assert_eq!(orchestrator.sessions().len(), 1);

    let evicted = orchestrator.evict_session("s1").expect("eviction returns the session");
    assert_eq!(evicted.session_id, "s1");
    assert!(orchestrator.session("s1").is_none());
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn given_workflow_without_session_persistence_when_submitted_then_no_session_is_created() {
    let (orchestrator, _sink) = ready_orchestrator(SESSION_SCRIPT).await;

    let result = orchestrator
        .submit(CognitiveTask::new(TaskType::CrossPlatformSync))
        .await;

    assert!(result.success);
    assert_eq!(result.session_id.as_deref(), Some("s1"));
    assert!(orchestrator.session("s1").is_none());
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn given_persistence_disabled_when_submitted_then_sessions_stay_empty() {
    let orchestrator = shell_builder(SESSION_SCRIPT)
        .persist_sessions(false)
        .disable_forensic()
        .build()
        .expect("orchestrator should build");
    orchestrator.initialize().await.expect("initialize");

    let result = orchestrator
        .submit(CognitiveTask::new(TaskType::Research))
        .await;

    assert!(result.success);
    assert_eq!(orchestrator.get_metrics().session_count, 0);
    orchestrator.shutdown().await;
}

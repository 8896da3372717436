use std::sync::Arc;

use serde_json::json;

use noesis::{
    aggregator::UNKNOWN_TASK_TYPE,
    error::OrchestrationErrorKind,
    executor::ExecutorLimits,
    types::{CognitiveTask, Priority, TaskRequest, TaskType},
};

use crate::support::{FailingForensicSink, live_processes, ready_orchestrator, shell_builder};

#[tokio::test]
async fn given_every_declared_task_type_when_resolved_then_a_handler_exists() {
    let (orchestrator, _sink) = ready_orchestrator("printf '{}'").await;
    for task_type in TaskType::ALL {
        let handler = orchestrator
            .registry()
            .resolve(task_type)
            .expect("every task type must be routable");
        assert_eq!(handler.task_type(), task_type);
    }
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn given_undeclared_task_type_when_submitted_then_unknown_task_type_is_returned() {
    let (orchestrator, sink) = ready_orchestrator("printf '{}'").await;

    let result = orchestrator.submit(TaskRequest::new("astrology")).await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(OrchestrationErrorKind::UnknownTaskType));
    assert!(
        result
            .error
            .as_deref()
            .is_some_and(|error| error.contains("UnknownTaskType"))
    );

    let metrics = orchestrator.get_metrics();
    assert_eq!(metrics.total_operations, 1);
    assert_eq!(metrics.failure_count, 1);
    assert_eq!(metrics.active_operations, 0);

    orchestrator.flush_forensic().await;
    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].task_type, "astrology");
    assert!(!entries[0].success);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn given_many_distinct_undeclared_types_when_submitted_then_type_counts_stay_bounded() {
    let (orchestrator, sink) = ready_orchestrator("printf '{}'").await;

    for index in 0..20 {
        let result = orchestrator
            .submit(TaskRequest::new(format!("made_up_{index}")))
            .await;
        assert_eq!(result.error_kind, Some(OrchestrationErrorKind::UnknownTaskType));
    }
    let accepted = orchestrator
        .submit(CognitiveTask::new(TaskType::Research))
        .await;
    assert!(accepted.success);

    let metrics = orchestrator.get_metrics();
    assert_eq!(metrics.total_operations, 21);
    assert_eq!(metrics.task_type_counts.len(), 2);
    assert_eq!(metrics.task_type_counts.get(UNKNOWN_TASK_TYPE), Some(&20));
    assert_eq!(metrics.task_type_counts.get("research"), Some(&1));

    orchestrator.flush_forensic().await;
    let entries = sink.entries();
    assert_eq!(entries.len(), 21);
    assert_eq!(entries[0].task_type, "made_up_0");
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn given_process_exiting_two_when_submitted_then_error_contains_stderr() {
    let (orchestrator, _sink) = ready_orchestrator("echo boom >&2; exit 2").await;

    let result = orchestrator
        .submit(CognitiveTask::new(TaskType::Analysis))
        .await;

    assert!(!result.success);
    assert_eq!(
        result.error_kind,
        Some(OrchestrationErrorKind::ProcessExecution)
    );
    assert!(result.error.as_deref().is_some_and(|error| error.contains("boom")));
    assert_eq!(orchestrator.get_metrics().failure_count, 1);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn given_plain_text_output_when_submitted_then_result_is_degraded_success() {
    let (orchestrator, _sink) = ready_orchestrator("echo 'not json'").await;

    let result = orchestrator
        .submit(CognitiveTask::new(TaskType::CodeGeneration))
        .await;

    assert!(result.success);
    assert_eq!(result.result, Some(json!({"output": "not json"})));
    assert!(
        result
            .parsing_error
            .as_deref()
            .is_some_and(|message| !message.is_empty())
    );
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn given_task_payload_when_submitted_then_process_sees_it_in_environment() {
    let (orchestrator, _sink) = ready_orchestrator(r#"printf '%s' "$NOESIS_TASK_PAYLOAD""#).await;

    let task = CognitiveTask::new(TaskType::LegalReasoning)
        .with_priority(Priority::Critical)
        .with_context("matter", json!("acme v. roadrunner"))
        .with_models(["reasoner-large"]);
    let result = orchestrator.submit(task.clone()).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    let payload = result.result.expect("payload echoed back");
    assert_eq!(payload["task_id"], json!(task.id));
    assert_eq!(payload["task_type"], "legal_reasoning");
    assert_eq!(payload["priority"], "critical");
    assert_eq!(payload["context"]["matter"], "acme v. roadrunner");
    assert_eq!(payload["models"], json!(["reasoner-large"]));
    assert_eq!(payload["workflow"]["name"], "legal_reasoning");
    assert_eq!(payload["operation_id"], json!(result.operation_id));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn given_process_exceeding_timeout_when_submitted_then_timeout_failure_is_returned() {
    let orchestrator = shell_builder("exec sleep 30")
        .executor_limits(ExecutorLimits {
            default_timeout_ms: 300,
            max_timeout_ms: 300,
            ..ExecutorLimits::default()
        })
        .disable_forensic()
        .build()
        .expect("orchestrator should build");
    orchestrator.initialize().await.expect("initialize");

    let result = orchestrator
        .submit(CognitiveTask::new(TaskType::Research))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(OrchestrationErrorKind::Timeout));
    assert!(result.error.as_deref().is_some_and(|error| error.contains("timeout")));
    assert_eq!(orchestrator.get_metrics().active_operations, 0);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn given_script_running_a_child_when_timeout_elapses_then_no_child_survives() {
    let orchestrator = shell_builder("sleep 37.123; echo done")
        .executor_limits(ExecutorLimits {
            default_timeout_ms: 300,
            max_timeout_ms: 300,
            ..ExecutorLimits::default()
        })
        .disable_forensic()
        .build()
        .expect("orchestrator should build");
    orchestrator.initialize().await.expect("initialize");

    let result = orchestrator
        .submit(CognitiveTask::new(TaskType::Research))
        .await;
    assert_eq!(result.error_kind, Some(OrchestrationErrorKind::Timeout));

    let mut survivors = live_processes(&["sleep", "37.123"]);
    for _ in 0..50 {
        if survivors.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        survivors = live_processes(&["sleep", "37.123"]);
    }
    assert!(survivors.is_empty(), "sleep outlived its operation: {survivors:?}");
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn given_failing_forensic_sink_when_submitted_then_result_is_unchanged() {
    let script = r#"printf '{"answer":42,"model_used":"gpt"}'"#;
    let (healthy, _sink) = ready_orchestrator(script).await;
    let failing = shell_builder(script)
        .forensic_sink(Arc::new(FailingForensicSink))
        .build()
        .expect("orchestrator should build");
    failing.initialize().await.expect("initialize");

    let expected = healthy.submit(CognitiveTask::new(TaskType::Analysis)).await;
    let actual = failing.submit(CognitiveTask::new(TaskType::Analysis)).await;

    assert!(actual.success);
    assert_eq!(actual.result, expected.result);
    assert_eq!(actual.model_used, expected.model_used);
    assert_eq!(actual.error, None);

    failing.flush_forensic().await;
    let metrics = failing.get_metrics();
    assert_eq!(metrics.forensic_write_failures, 1);
    assert_eq!(metrics.success_count, 1);

    healthy.shutdown().await;
    failing.shutdown().await;
}

#[tokio::test]
async fn given_running_operation_when_cancelled_then_it_fails_as_cancelled() {
    let (orchestrator, _sink) = ready_orchestrator("exec sleep 30").await;
    let mut events = orchestrator.subscribe();

    let submitter = orchestrator.clone();
    let pending =
        tokio::spawn(async move { submitter.submit(CognitiveTask::new(TaskType::Research)).await });

    let operation_id = loop {
        match events.recv().await.expect("event stream open") {
            noesis::engine::OrchestratorEvent::OperationStarted { operation_id, .. } => {
                break operation_id;
            }
            _ => continue,
        }
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(orchestrator.cancel(&operation_id));

    let result = pending.await.expect("submit task should join");
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(OrchestrationErrorKind::Cancelled));
    assert!(!orchestrator.cancel(&operation_id));
    assert_eq!(orchestrator.get_metrics().active_operations, 0);
    orchestrator.shutdown().await;
}

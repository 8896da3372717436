use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use noesis::executor::{
    ExecutionError, ExecutorLimits, ProcessExecutor, ScriptSpec, Secrets, TASK_PAYLOAD_ENV,
};

fn shell(script: &str) -> ScriptSpec {
    ScriptSpec::new("/bin/sh").args(["-c", script])
}

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("noesis-executor-{name}-{}", Uuid::now_v7()))
}

fn process_alive(pid: &str) -> bool {
    // Zombies count as gone; only a reaper is missing.
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .is_some_and(|zombie| !zombie)
}

async fn gone_within(pid: &str, limit: Duration) -> bool {
    let deadline = std::time::Instant::now() + limit;
    while process_alive(pid) {
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}

fn read_pid(pid_file: &Path) -> String {
    let pid = std::fs::read_to_string(pid_file).expect("pid file should exist");
    let _ = std::fs::remove_file(pid_file);
    pid.trim().to_string()
}

#[tokio::test]
async fn given_json_object_on_stdout_when_execute_then_payload_is_parsed() {
    let executor = ProcessExecutor::default();
    let result = executor
        .execute(
            &shell(r#"printf '{"session_id":"s1","model_used":"gpt"}'"#),
            &json!({}),
            &Secrets::new(),
            Duration::from_secs(5),
        )
        .await
        .expect("process should succeed");

    assert!(result.success);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.payload, json!({"session_id": "s1", "model_used": "gpt"}));
    assert!(result.parsing_error.is_none());
}

#[tokio::test]
async fn given_exit_code_two_when_execute_then_stderr_is_surfaced() {
    let executor = ProcessExecutor::default();
    let err = executor
        .execute(
            &shell("echo boom >&2; exit 2"),
            &json!({}),
            &Secrets::new(),
            Duration::from_secs(5),
        )
        .await
        .expect_err("non-zero exit must fail");

    match &err {
        ExecutionError::NonZeroExit { exit_code, stderr } => {
            assert_eq!(*exit_code, 2);
            assert_eq!(stderr, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn given_plain_text_on_stdout_when_execute_then_result_is_degraded_not_failed() {
    let executor = ProcessExecutor::default();
    let result = executor
        .execute(
            &shell("echo 'not json'"),
            &json!({}),
            &Secrets::new(),
            Duration::from_secs(5),
        )
        .await
        .expect("degraded output is still a success");

    assert!(result.success);
    assert_eq!(result.payload, json!({"output": "not json"}));
    assert!(result.parsing_error.is_some_and(|message| !message.is_empty()));
}

#[tokio::test]
async fn given_slow_process_when_timeout_elapses_then_it_is_killed() {
    let pid_file = scratch_file("timeout-pid");
    let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());
    let executor = ProcessExecutor::default();

    let err = executor
        .execute(
            &shell(&script),
            &json!({}),
            &Secrets::new(),
            Duration::from_millis(500),
        )
        .await
        .expect_err("slow process must time out");

    assert!(matches!(err, ExecutionError::Timeout { .. }));
    assert!(err.to_string().contains("timeout"));

    let pid = read_pid(&pid_file);
    assert!(
        gone_within(&pid, Duration::from_secs(2)).await,
        "timed out process {pid} is still running"
    );
}

#[tokio::test]
async fn given_script_with_background_helper_when_timeout_elapses_then_helper_is_killed_too() {
    let pid_file = scratch_file("timeout-helper-pid");
    let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());
    let executor = ProcessExecutor::default();

    let err = executor
        .execute(
            &shell(&script),
            &json!({}),
            &Secrets::new(),
            Duration::from_millis(500),
        )
        .await
        .expect_err("slow script must time out");
    assert!(matches!(err, ExecutionError::Timeout { .. }));

    let pid = read_pid(&pid_file);
    assert!(
        gone_within(&pid, Duration::from_secs(2)).await,
        "helper {pid} outlived the timed out script"
    );
}

#[tokio::test]
async fn given_script_with_background_helper_when_cancelled_then_helper_is_killed_too() {
    let pid_file = scratch_file("cancel-helper-pid");
    let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());
    let executor = ProcessExecutor::default();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let err = executor
        .execute_with_cancel(
            &shell(&script),
            &json!({}),
            &Secrets::new(),
            Duration::from_secs(30),
            &cancel,
        )
        .await
        .expect_err("cancelled script must fail");
    assert!(matches!(err, ExecutionError::Cancelled { .. }));

    let pid = read_pid(&pid_file);
    assert!(
        gone_within(&pid, Duration::from_secs(2)).await,
        "helper {pid} outlived the cancelled script"
    );
}

#[tokio::test]
async fn given_helper_holding_stdout_when_script_exits_zero_then_result_is_returned_promptly() {
    let pid_file = scratch_file("detached-helper-pid");
    let script = format!(
        r#"sleep 30 & echo $! > {}; printf '{{"ok":true}}'"#,
        pid_file.display()
    );
    let executor = ProcessExecutor::default();

    let started = std::time::Instant::now();
    let result = executor
        .execute(
            &shell(&script),
            &json!({}),
            &Secrets::new(),
            Duration::from_secs(10),
        )
        .await
        .expect("script exited zero");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.payload, json!({"ok": true}));

    let pid = read_pid(&pid_file);
    assert!(
        gone_within(&pid, Duration::from_secs(2)).await,
        "helper {pid} outlived its script"
    );
}

#[tokio::test]
async fn given_cancelled_token_when_execute_then_process_is_killed() {
    let executor = ProcessExecutor::default();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = executor
        .execute_with_cancel(
            &shell("exec sleep 30"),
            &json!({}),
            &Secrets::new(),
            Duration::from_secs(30),
            &cancel,
        )
        .await
        .expect_err("cancelled process must fail");

    assert!(matches!(err, ExecutionError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn given_payload_and_secrets_when_execute_then_both_arrive_via_environment_only() {
    let args_file = scratch_file("argv");
    let script = format!(
        r#"echo "$@" > {args}; printf '{{"payload":%s,"secret":"%s"}}' "${payload}" "$NOESIS_TEST_SECRET""#,
        args = args_file.display(),
        payload = TASK_PAYLOAD_ENV,
    );
    let executor = ProcessExecutor::default();
    let secrets = Secrets::new().with("NOESIS_TEST_SECRET", "hunter2");

    let result = executor
        .execute(
            &shell(&script).arg("sh").arg("visible-arg"),
            &json!({"topic": "fusion"}),
            &secrets,
            Duration::from_secs(5),
        )
        .await
        .expect("process should succeed");

    assert_eq!(result.payload["payload"], json!({"topic": "fusion"}));
    assert_eq!(result.payload["secret"], "hunter2");

    let argv = std::fs::read_to_string(&args_file).expect("argv file should exist");
    assert!(argv.contains("visible-arg"));
    assert!(!argv.contains("hunter2"));
    assert!(!argv.contains("fusion"));
    let _ = std::fs::remove_file(&args_file);
}

#[tokio::test]
async fn given_configured_ceiling_when_requested_timeout_is_larger_then_ceiling_applies() {
    let executor = ProcessExecutor::new(ExecutorLimits {
        default_timeout_ms: 1_000,
        max_timeout_ms: 300,
        ..ExecutorLimits::default()
    });
    let timeout = executor.limits().effective_timeout(Some(60_000));

    let err = executor
        .execute(&shell("exec sleep 30"), &json!({}), &Secrets::new(), timeout)
        .await
        .expect_err("ceiling must cut the process short");
    assert!(matches!(err, ExecutionError::Timeout { .. }));
}

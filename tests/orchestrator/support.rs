use std::sync::Arc;

use async_trait::async_trait;

use noesis::{
    config::EngineBootstrapConfig,
    forensic::{ForensicEntry, ForensicSink, ForensicWriteError, MemoryForensicSink},
    orchestrator::{Orchestrator, OrchestratorBuilder},
    types::TaskType,
    workflow::WorkflowOverride,
};

/// Routes every task type to `/bin/sh -c <script>`.
pub fn shell_builder(script: &str) -> OrchestratorBuilder {
    TaskType::ALL
        .into_iter()
        .fold(Orchestrator::builder(), |builder, task_type| {
            builder.workflow(task_type, shell_workflow(script))
        })
}

pub fn shell_workflow(script: &str) -> WorkflowOverride {
    WorkflowOverride {
        program: Some("/bin/sh".to_string()),
        args: Some(vec!["-c".to_string(), script.to_string()]),
        ..WorkflowOverride::default()
    }
}

pub async fn ready_orchestrator(script: &str) -> (Orchestrator, Arc<MemoryForensicSink>) {
    let sink = Arc::new(MemoryForensicSink::new());
    let orchestrator = shell_builder(script)
        .forensic_sink(sink.clone())
        .build()
        .expect("orchestrator should build");
    orchestrator
        .initialize()
        .await
        .expect("orchestrator should initialize");
    (orchestrator, sink)
}

pub fn shell_engine(script: &str) -> EngineBootstrapConfig {
    EngineBootstrapConfig {
        program: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        env: Default::default(),
        cwd: None,
        startup_grace_ms: 300,
    }
}

/// Pids of live, non-zombie processes whose argv is exactly `argv`.
pub fn live_processes(argv: &[&str]) -> Vec<String> {
    let wanted = argv.join("\0");
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|pid| pid.chars().all(|c| c.is_ascii_digit()))
        .filter(|pid| {
            std::fs::read(format!("/proc/{pid}/cmdline"))
                .map(|raw| String::from_utf8_lossy(&raw).trim_end_matches('\0') == wanted)
                .unwrap_or(false)
        })
        .filter(|pid| {
            std::fs::read_to_string(format!("/proc/{pid}/stat"))
                .ok()
                .and_then(|stat| {
                    stat.rsplit_once(')')
                        .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                })
                .unwrap_or(false)
        })
        .collect()
}

pub struct FailingForensicSink;

#[async_trait]
impl ForensicSink for FailingForensicSink {
    async fn persist(&self, _entry: &ForensicEntry) -> Result<(), ForensicWriteError> {
        Err(ForensicWriteError::Unavailable(
            "audit store offline".to_string(),
        ))
    }
}

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde_json::Value;
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    forensic::{
        sink::ForensicSink,
        types::{AuditSubject, ForensicEntry, ForensicWriteError},
    },
    observability::metrics::record_forensic_write_failure,
    types::OrchestrationResult,
};

enum WriterCommand {
    Append(ForensicEntry),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget audit trail. Entries are built on the caller's side and
/// handed to a single writer task, so the sink sees them in completion
/// order. Persistence failures are counted and logged, never returned.
pub struct ForensicLogger {
    tx: mpsc::Sender<WriterCommand>,
    shutdown: CancellationToken,
    writer: Mutex<Option<JoinHandle<()>>>,
    failures: Arc<AtomicU64>,
    host_id: String,
}

impl ForensicLogger {
    /// Starts the writer task; must be called inside a Tokio runtime.
    pub fn spawn(sink: Arc<dyn ForensicSink>, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let failures = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();
        let writer = tokio::spawn(run_writer(
            sink,
            rx,
            Arc::clone(&failures),
            shutdown.clone(),
        ));

        Self {
            tx,
            shutdown,
            writer: Mutex::new(Some(writer)),
            failures,
            host_id: host_identifier(),
        }
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn write_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn log(
        &self,
        operation_id: &str,
        subject: &AuditSubject,
        outcome: &OrchestrationResult,
        duration: Duration,
    ) {
        let entry = build_entry(
            operation_id,
            subject,
            outcome,
            duration,
            OffsetDateTime::now_utc(),
            &self.host_id,
        );

        let err = match self.tx.try_send(WriterCommand::Append(entry)) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => ForensicWriteError::QueueFull,
            Err(TrySendError::Closed(_)) => ForensicWriteError::Closed,
        };
        report_failure(&self.failures, operation_id, &err);
    }

    /// Resolves after every entry queued before this call has been handed
    /// to the sink.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Drains the queue and stops the writer. Idempotent.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let writer = self.writer.lock().expect("lock poisoned").take();
        if let Some(writer) = writer
            && let Err(err) = writer.await
        {
            tracing::warn!(target: "forensic", error = %err, "forensic_writer_join_failed");
        }
    }
}

async fn run_writer(
    sink: Arc<dyn ForensicSink>,
    mut rx: mpsc::Receiver<WriterCommand>,
    failures: Arc<AtomicU64>,
    shutdown: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            biased;
            command = rx.recv() => command,
            _ = shutdown.cancelled() => None,
        };
        let Some(command) = command else {
            break;
        };
        apply(sink.as_ref(), command, &failures).await;
    }

    rx.close();
    while let Some(command) = rx.recv().await {
        apply(sink.as_ref(), command, &failures).await;
    }
    tracing::debug!(target: "forensic", "forensic_writer_stopped");
}

async fn apply(sink: &dyn ForensicSink, command: WriterCommand, failures: &AtomicU64) {
    match command {
        WriterCommand::Append(entry) => {
            if let Err(err) = sink.persist(&entry).await {
                report_failure(failures, &entry.operation_id, &err);
            }
        }
        WriterCommand::Flush(ack) => {
            let _ = ack.send(());
        }
    }
}

fn report_failure(failures: &AtomicU64, operation_id: &str, err: &ForensicWriteError) {
    failures.fetch_add(1, Ordering::Relaxed);
    record_forensic_write_failure();
    tracing::warn!(
        target: "forensic",
        operation_id = %operation_id,
        error = %err,
        "forensic_write_failed"
    );
}

pub fn build_entry(
    operation_id: &str,
    subject: &AuditSubject,
    outcome: &OrchestrationResult,
    duration: Duration,
    completed_at: OffsetDateTime,
    host_id: &str,
) -> ForensicEntry {
    let timestamp = completed_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| completed_at.unix_timestamp().to_string());

    let mut models_used = subject.models.clone();
    if let Some(model) = &outcome.model_used
        && !models_used.contains(model)
    {
        models_used.push(model.clone());
    }

    ForensicEntry {
        operation_id: operation_id.to_string(),
        chain_of_custody: chain_of_custody(operation_id, &timestamp, host_id),
        timestamp,
        task_type: subject.task_type.clone(),
        priority: subject.priority,
        models_used,
        session_id: outcome.session_id.clone(),
        success: outcome.success,
        duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        data_hash: data_hash(outcome),
    }
}

/// Hex SHA-256 over the key-sorted JSON form of the outcome.
pub fn data_hash(outcome: &OrchestrationResult) -> String {
    let value = match serde_json::to_value(outcome) {
        Ok(value) => canonicalize_json(&value),
        Err(err) => Value::String(format!("unserializable outcome: {err}")),
    };

    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn chain_of_custody(operation_id: &str, completed_at: &str, host_id: &str) -> String {
    format!("{host_id}/{operation_id}/{completed_at}")
}

pub fn host_identifier() -> String {
    let host = sysinfo::System::host_name().unwrap_or_else(|| "unknown-host".to_string());
    format!("{host}:{}", std::process::id())
}

fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys = map.keys().cloned().collect::<Vec<_>>();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(item) = map.get(&key) {
                    sorted.insert(key, canonicalize_json(item));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        _ => value.clone(),
    }
}

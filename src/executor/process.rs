use std::{
    io,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use serde_json::{Value, json};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    task::JoinHandle,
    time::{Instant, sleep_until, timeout_at},
};
use tokio_util::sync::CancellationToken;

use crate::executor::{
    error::ExecutionError,
    secrets::Secrets,
    types::{ExecutionResult, ExecutorLimits, ScriptSpec, TASK_PAYLOAD_ENV},
};

const READ_CHUNK_BYTES: usize = 8 * 1024;

type CapturedStream = JoinHandle<io::Result<(Vec<u8>, bool)>>;

enum WaitOutcome {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs one reasoning script per call as an isolated child process.
///
/// The child leads its own process group. Every exit path, including a
/// dropped future, kills the whole group, so helpers the script started do
/// not outlive the operation.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    limits: ExecutorLimits,
}

impl ProcessExecutor {
    pub fn new(limits: ExecutorLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ExecutorLimits {
        &self.limits
    }

    pub async fn execute(
        &self,
        script: &ScriptSpec,
        payload: &Value,
        secrets: &Secrets,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.execute_with_cancel(script, payload, secrets, timeout, &CancellationToken::new())
            .await
    }

    #[tracing::instrument(
        name = "process_execute",
        target = "executor",
        skip_all,
        fields(program = %script.program, timeout_ms = timeout.as_millis() as u64)
    )]
    pub async fn execute_with_cancel(
        &self,
        script: &ScriptSpec,
        payload: &Value,
        secrets: &Secrets,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        let payload_text = serde_json::to_string(payload)?;

        let mut command = Command::new(&script.program);
        command.args(&script.args);
        if let Some(cwd) = &script.cwd {
            command.current_dir(cwd);
        }
        command.envs(&script.env);
        command.env(TASK_PAYLOAD_ENV, payload_text);
        command.envs(secrets.iter());
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.process_group(0);
        command.kill_on_drop(true);

        let started = Instant::now();
        let deadline = started + timeout;
        let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
            program: script.program.clone(),
            source,
        })?;
        let mut group = ProcessGroup::new(child.id());
        tracing::debug!(target: "executor", pid = child.id(), "process_spawned");

        let mut stdout_reader = capture(child.stdout.take(), self.limits.stdout_max_bytes);
        let mut stderr_reader = capture(child.stderr.take(), self.limits.stderr_max_bytes);

        let outcome = tokio::select! {
            status = child.wait() => WaitOutcome::Exited(status),
            _ = sleep_until(deadline) => WaitOutcome::TimedOut,
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        let status = match outcome {
            WaitOutcome::Exited(Ok(status)) => status,
            WaitOutcome::Exited(Err(err)) => {
                group.kill();
                terminate(&mut child).await;
                stdout_reader.abort();
                stderr_reader.abort();
                return Err(ExecutionError::Wait(err));
            }
            WaitOutcome::TimedOut => {
                group.kill();
                terminate(&mut child).await;
                stdout_reader.abort();
                stderr_reader.abort();
                let elapsed = started.elapsed();
                tracing::warn!(
                    target: "executor",
                    elapsed_ms = elapsed.as_millis() as u64,
                    "process_timed_out"
                );
                return Err(ExecutionError::Timeout { elapsed });
            }
            WaitOutcome::Cancelled => {
                group.kill();
                terminate(&mut child).await;
                stdout_reader.abort();
                stderr_reader.abort();
                let elapsed = started.elapsed();
                tracing::info!(
                    target: "executor",
                    elapsed_ms = elapsed.as_millis() as u64,
                    "process_cancelled"
                );
                return Err(ExecutionError::Cancelled { elapsed });
            }
        };

        // Leftover group members would hold the pipes open.
        group.kill();
        // A process that left the group can still hold them, so draining is
        // bounded by the same deadline.
        let drained = timeout_at(deadline, async {
            let stdout = collect(&mut stdout_reader, "stdout").await;
            let stderr = collect(&mut stderr_reader, "stderr").await;
            (stdout, stderr)
        })
        .await;
        let ((stdout, stdout_truncated), (stderr, stderr_truncated)) = match drained {
            Ok(streams) => streams,
            Err(_) => {
                stdout_reader.abort();
                stderr_reader.abort();
                return Err(ExecutionError::Timeout {
                    elapsed: started.elapsed(),
                });
            }
        };

        let exit_code = status.code().unwrap_or(-1);
        let stdout_text = String::from_utf8_lossy(&stdout).to_string();
        let stderr_text = String::from_utf8_lossy(&stderr).to_string();

        if !status.success() {
            tracing::debug!(target: "executor", exit_code, "process_failed");
            return Err(ExecutionError::NonZeroExit {
                exit_code,
                stderr: stderr_text.trim().to_string(),
            });
        }

        let (payload, parsing_error) = interpret_stdout(&stdout_text);
        if let Some(parsing_error) = &parsing_error {
            tracing::warn!(
                target: "executor",
                error = %parsing_error,
                stdout_truncated,
                "process_output_unstructured"
            );
        }

        Ok(ExecutionResult {
            success: true,
            payload,
            parsing_error,
            exit_code,
            stderr: stderr_text,
            stdout_truncated,
            stderr_truncated,
            elapsed: started.elapsed(),
        })
    }
}

/// Interprets a zero-exit stdout. Anything other than a single JSON object
/// degrades to `{"output": <raw text>}` plus a parsing error message.
pub fn interpret_stdout(stdout: &str) -> (Value, Option<String>) {
    let trimmed = stdout.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(object)) => (Value::Object(object), None),
        Ok(other) => (
            json!({ "output": trimmed }),
            Some(format!(
                "expected a JSON object on stdout, found {}",
                json_kind(&other)
            )),
        ),
        Err(err) => (
            json!({ "output": trimmed }),
            Some(format!("stdout is not valid JSON: {err}")),
        ),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn capture<R>(stream: Option<R>, cap: usize) -> CapturedStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut stream) = stream else {
            return Ok((Vec::new(), false));
        };

        let mut kept = Vec::new();
        let mut truncated = false;
        let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
        loop {
            let read = stream.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            // Keep draining past the cap so the child never blocks on a full pipe.
            let room = cap.saturating_sub(kept.len());
            if read > room {
                truncated = true;
            }
            kept.extend_from_slice(&chunk[..read.min(room)]);
        }

        Ok((kept, truncated))
    })
}

async fn collect(reader: &mut CapturedStream, stream: &'static str) -> (Vec<u8>, bool) {
    match reader.await {
        Ok(Ok(captured)) => captured,
        Ok(Err(err)) => {
            tracing::warn!(target: "executor", stream, error = %err, "process_stream_read_failed");
            (Vec::new(), false)
        }
        Err(err) => {
            tracing::warn!(target: "executor", stream, error = %err, "process_stream_reader_failed");
            (Vec::new(), false)
        }
    }
}

/// Process group led by a spawned child. Killed at most once.
struct ProcessGroup {
    pgid: Option<libc::pid_t>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| libc::pid_t::try_from(pid).ok()),
        }
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        // SAFETY: killpg only sends a signal; no memory is shared with libc.
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                tracing::warn!(
                    target: "executor",
                    pgid,
                    error = %err,
                    "process_group_kill_failed"
                );
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn terminate(child: &mut Child) {
    if let Err(err) = child.kill().await {
        tracing::warn!(target: "executor", error = %err, "process_kill_failed");
    }
}

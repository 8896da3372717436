use std::{
    process::Stdio,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::EngineBootstrapConfig,
    engine::{
        error::InitializationError,
        events::{EngineStream, EventBus, OrchestratorEvent},
    },
};

struct RunningEngine {
    pid: Option<u32>,
    stop: CancellationToken,
    exited: Arc<AtomicBool>,
    monitor: JoinHandle<()>,
    forwarders: Vec<JoinHandle<()>>,
}

/// Owns the optional long-lived reasoning engine process that backs the
/// per-operation scripts.
pub struct EngineSupervisor {
    bootstrap: Option<EngineBootstrapConfig>,
    running: Mutex<Option<RunningEngine>>,
}

impl EngineSupervisor {
    pub fn new(bootstrap: Option<EngineBootstrapConfig>) -> Self {
        Self {
            bootstrap,
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .is_some_and(|engine| !engine.exited.load(Ordering::Acquire))
    }

    pub fn pid(&self) -> Option<u32> {
        self.running
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .and_then(|engine| engine.pid)
    }

    /// Spawns the engine and waits out its startup grace period. Returns the
    /// engine pid, or `None` when no bootstrap process is configured.
    pub async fn start(
        &self,
        events: &Arc<EventBus>,
    ) -> Result<Option<u32>, InitializationError> {
        let Some(bootstrap) = self.bootstrap.as_ref() else {
            return Ok(None);
        };
        if self.is_running() {
            return Ok(self.pid());
        }
        self.stop().await;

        let mut command = Command::new(&bootstrap.program);
        command.args(&bootstrap.args);
        if let Some(cwd) = &bootstrap.cwd {
            command.current_dir(cwd);
        }
        command.envs(&bootstrap.env);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|source| InitializationError::EngineSpawn {
                program: bootstrap.program.clone(),
                source,
            })?;
        let pid = child.id();

        let mut forwarders = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(forward_lines(stdout, EngineStream::Stdout, Arc::clone(events)));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(forward_lines(stderr, EngineStream::Stderr, Arc::clone(events)));
        }

        tokio::time::sleep(Duration::from_millis(bootstrap.startup_grace_ms)).await;

        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                abort_all(&forwarders);
                return Err(InitializationError::EngineExited {
                    exit_code: status.code(),
                });
            }
            Err(err) => {
                abort_all(&forwarders);
                return Err(InitializationError::Probe(err));
            }
        }

        tracing::info!(
            target: "engine",
            program = %bootstrap.program,
            pid = ?pid,
            "engine_started"
        );

        let stop = CancellationToken::new();
        let exited = Arc::new(AtomicBool::new(false));
        let monitor = tokio::spawn(monitor_engine(
            child,
            stop.clone(),
            Arc::clone(&exited),
            Arc::clone(events),
        ));

        *self.running.lock().expect("lock poisoned") = Some(RunningEngine {
            pid,
            stop,
            exited,
            monitor,
            forwarders,
        });
        Ok(pid)
    }

    /// Terminates the engine if it is still running. Idempotent.
    pub async fn stop(&self) {
        let running = self.running.lock().expect("lock poisoned").take();
        let Some(engine) = running else {
            return;
        };

        engine.stop.cancel();
        if let Err(err) = engine.monitor.await {
            tracing::warn!(target: "engine", error = %err, "engine_monitor_join_failed");
        }
        abort_all(&engine.forwarders);
    }
}

impl Drop for EngineSupervisor {
    fn drop(&mut self) {
        let running = self.running.get_mut().map(Option::take).unwrap_or(None);
        if let Some(engine) = running {
            engine.stop.cancel();
            abort_all(&engine.forwarders);
        }
    }
}

async fn monitor_engine(
    mut child: Child,
    stop: CancellationToken,
    exited: Arc<AtomicBool>,
    events: Arc<EventBus>,
) {
    let exited_on_its_own = tokio::select! {
        status = child.wait() => Some(status),
        _ = stop.cancelled() => None,
    };

    match exited_on_its_own {
        Some(status) => {
            exited.store(true, Ordering::Release);
            let exit_code = status.as_ref().ok().and_then(|status| status.code());
            tracing::warn!(target: "engine", exit_code = ?exit_code, "engine_exited");
            events.publish(OrchestratorEvent::EngineExited { exit_code });
        }
        None => {
            if let Err(err) = child.kill().await {
                tracing::warn!(target: "engine", error = %err, "engine_kill_failed");
            }
            exited.store(true, Ordering::Release);
            tracing::info!(target: "engine", "engine_stopped");
        }
    }
}

fn forward_lines<R>(reader: R, stream: EngineStream, events: Arc<EventBus>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::debug!(
                        target: "engine",
                        stream = stream.as_str(),
                        line = %line,
                        "engine_output"
                    );
                    events.publish(OrchestratorEvent::EngineOutput { stream, line });
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!(
                        target: "engine",
                        stream = stream.as_str(),
                        error = %err,
                        "engine_output_read_failed"
                    );
                    break;
                }
            }
        }
    })
}

fn abort_all(handles: &[JoinHandle<()>]) {
    for handle in handles {
        handle.abort();
    }
}

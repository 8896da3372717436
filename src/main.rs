use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    signal::unix::{SignalKind, signal},
    sync::mpsc,
    task::JoinSet,
};

use noesis::{
    cli::parse_args,
    config::Config,
    error::internal_error,
    logging::init_tracing,
    observability::metrics::start_prometheus_exporter,
    orchestrator::Orchestrator,
    types::{OrchestrationResult, TaskRequest},
    workflow::WorkflowRegistry,
};

enum ExitReason {
    InputClosed,
    Signal(&'static str),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    let config = Config::load(&args.config_path)
        .with_context(|| format!("failed to load config from {}", args.config_path.display()))?;

    if args.check_only {
        WorkflowRegistry::with_builtins(&config.engine.reasoner_program, &config.workflows)
            .context("workflow table is invalid")?;
        eprintln!("config OK: {}", args.config_path.display());
        return Ok(());
    }

    let logging = init_tracing(&config.logging)?;
    if config.metrics.enabled {
        let runtime = start_prometheus_exporter(config.metrics.listen_addr)
            .context("failed to start prometheus exporter")?;
        tracing::info!(target: "metrics", listen_addr = %runtime.listen_addr, "metrics_exporter_started");
    }

    let orchestrator =
        Orchestrator::from_config(&config).context("failed to build orchestrator")?;
    orchestrator
        .initialize()
        .await
        .context("failed to initialize orchestrator")?;
    tracing::info!(target: "main", run_id = %logging.run_id(), "noesis_started");

    let (result_tx, mut result_rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(mut line) = result_rx.recv().await {
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let mut sigint =
        signal(SignalKind::interrupt()).context("unable to listen for SIGINT (Ctrl+C)")?;
    let mut sigterm = signal(SignalKind::terminate()).context("unable to listen for SIGTERM")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut submissions = JoinSet::new();

    let exit_reason = loop {
        tokio::select! {
            _ = sigint.recv() => break ExitReason::Signal("SIGINT"),
            _ = sigterm.recv() => break ExitReason::Signal("SIGTERM"),
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break ExitReason::InputClosed,
                    Err(err) => {
                        tracing::error!(target: "main", error = %err, "stdin_read_failed");
                        break ExitReason::InputClosed;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let result_tx = result_tx.clone();
                match serde_json::from_str::<TaskRequest>(&line) {
                    Ok(request) => {
                        let orchestrator = orchestrator.clone();
                        submissions.spawn(async move {
                            let result = orchestrator.submit(request).await;
                            emit(&result_tx, &result).await;
                        });
                    }
                    Err(err) => {
                        tracing::warn!(target: "main", error = %err, "task_request_invalid");
                        let err = internal_error(format!("invalid task request: {err}"));
                        emit(&result_tx, &OrchestrationResult::failure(None, &err, 0)).await;
                    }
                }
            }
            Some(joined) = submissions.join_next(), if !submissions.is_empty() => {
                if let Err(err) = joined {
                    tracing::error!(target: "main", error = %err, "submission_task_failed");
                }
            }
        }
    };

    if let ExitReason::Signal(signal_name) = exit_reason {
        eprintln!("received {signal_name}; shutting down orchestrator");
        orchestrator.shutdown().await;
    }
    while let Some(joined) = submissions.join_next().await {
        if let Err(err) = joined {
            tracing::error!(target: "main", error = %err, "submission_task_failed");
        }
    }
    orchestrator.shutdown().await;

    drop(result_tx);
    writer.await.context("result writer join failed")?;

    match exit_reason {
        ExitReason::InputClosed => eprintln!("noesis stopped: input closed"),
        ExitReason::Signal(signal_name) => eprintln!("noesis stopped: received {signal_name}"),
    }
    Ok(())
}

async fn emit(result_tx: &mpsc::Sender<String>, result: &OrchestrationResult) {
    match serde_json::to_string(result) {
        Ok(line) => {
            let _ = result_tx.send(line).await;
        }
        Err(err) => tracing::error!(target: "main", error = %err, "result_encode_failed"),
    }
}

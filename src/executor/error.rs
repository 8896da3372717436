use std::{io, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to spawn reasoning process `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode task payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("reasoning process exited with code {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },
    #[error("reasoning process exceeded timeout after {}ms", .elapsed.as_millis())]
    Timeout { elapsed: Duration },
    #[error("reasoning process cancelled after {}ms", .elapsed.as_millis())]
    Cancelled { elapsed: Duration },
    #[error("failed to wait for reasoning process: {0}")]
    Wait(#[source] io::Error),
}

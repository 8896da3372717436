use std::io;

use crate::workflow::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum InitializationError {
    #[error("workflow registry is invalid: {0}")]
    Registry(#[from] RegistryError),
    #[error("failed to spawn reasoning engine '{program}': {source}")]
    EngineSpawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("reasoning engine exited during startup with code {exit_code:?}")]
    EngineExited { exit_code: Option<i32> },
    #[error("failed to probe reasoning engine: {0}")]
    Probe(#[source] io::Error),
    #[error("orchestrator has been shut down")]
    ShutDown,
}

pub mod error;
pub mod process;
pub mod secrets;
pub mod types;

pub use error::ExecutionError;
pub use process::{ProcessExecutor, interpret_stdout};
pub use secrets::{EnvSecretProvider, SecretProvider, Secrets, StaticSecretProvider};
pub use types::{
    ExecutionResult, ExecutorLimits, OPERATION_ID_ENV, ScriptSpec, TASK_PAYLOAD_ENV, WORKFLOW_ENV,
};

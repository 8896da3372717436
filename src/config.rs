use std::{
    collections::BTreeMap,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    executor::ExecutorLimits, observability::metrics::MetricsRuntime, workflow::WorkflowOverrides,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub executor: ExecutorLimits,
    #[serde(default)]
    pub workflows: WorkflowOverrides,
    #[serde(default)]
    pub forensic: ForensicConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsExporterConfig,
}

fn default_enabled_true() -> bool {
    true
}

fn default_max_concurrent_operations() -> usize {
    8
}

fn default_event_capacity() -> usize {
    256
}

fn default_reasoner_program() -> String {
    "noesis-reasoner".to_string()
}

fn default_startup_grace_ms() -> u64 {
    500
}

fn default_forensic_path() -> PathBuf {
    PathBuf::from("./state/forensic.jsonl")
}

fn default_forensic_queue_capacity() -> usize {
    1024
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs/noesis")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    14
}

fn default_metrics_listen_addr() -> SocketAddr {
    MetricsRuntime::default_listen_addr()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_concurrent_operations")]
    pub max_concurrent_operations: usize,
    #[serde(default = "default_enabled_true")]
    pub persist_sessions: bool,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_operations: default_max_concurrent_operations(),
            persist_sessions: true,
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Program run for every workflow that does not name its own.
    #[serde(default = "default_reasoner_program")]
    pub reasoner_program: String,
    /// Environment variables forwarded to reasoning processes as secrets.
    #[serde(default)]
    pub secret_env: Vec<String>,
    #[serde(default)]
    pub bootstrap: Option<EngineBootstrapConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reasoner_program: default_reasoner_program(),
            secret_env: Vec::new(),
            bootstrap: None,
        }
    }
}

/// Long-lived engine process started by `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineBootstrapConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicConfig {
    #[serde(default = "default_enabled_true")]
    pub enabled: bool,
    #[serde(default = "default_forensic_path")]
    pub path: PathBuf,
    #[serde(default = "default_forensic_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ForensicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_forensic_path(),
            queue_capacity: default_forensic_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_enabled_true")]
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            stderr_warn_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsExporterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for MetricsExporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config_value: Value = json5::from_str(&config_content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let schema_path = resolve_schema_path(config_base, &config_value)?;
        validate_against_schema(&config_value, &schema_path)?;

        let mut config: Config =
            serde_json::from_value(config_value).context("failed to deserialize noesis config")?;
        config.resolve_relative_paths(config_base);

        Ok(config)
    }

    fn resolve_relative_paths(&mut self, config_base: &Path) {
        rebase(&mut self.forensic.path, config_base);
        rebase(&mut self.logging.dir, config_base);
        if let Some(bootstrap) = self.engine.bootstrap.as_mut()
            && let Some(cwd) = bootstrap.cwd.as_mut()
        {
            rebase(cwd, config_base);
        }
    }
}

fn rebase(path: &mut PathBuf, base: &Path) {
    if !path.is_absolute() {
        *path = base.join(&*path);
    }
}

fn resolve_schema_path(config_base: &Path, config_value: &Value) -> Result<PathBuf> {
    if let Some(path_text) = config_value.get("$schema").and_then(|value| value.as_str()) {
        let configured = PathBuf::from(path_text);
        if configured.is_absolute() {
            return Ok(configured);
        }
        return Ok(config_base.join(&configured));
    }

    let local_default = config_base.join("noesis.schema.json");
    if local_default.exists() {
        return Ok(local_default);
    }

    Err(anyhow!(
        "unable to resolve schema path: expected $schema in config or noesis.schema.json next to it"
    ))
}

fn validate_against_schema(config_value: &Value, schema_path: &Path) -> Result<()> {
    let schema_content = fs::read_to_string(schema_path)
        .with_context(|| format!("failed to read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_content)
        .with_context(|| format!("failed to parse schema {}", schema_path.display()))?;

    let compiled =
        JSONSchema::compile(&schema).map_err(|e| anyhow!("failed to compile schema: {e}"))?;

    match compiled.validate(config_value) {
        Ok(()) => Ok(()),
        Err(errors_iter) => {
            let validation_errors: Vec<ValidationError> = errors_iter.collect();
            let messages: Vec<String> = validation_errors
                .into_iter()
                .map(|error| error.to_string())
                .collect();
            Err(anyhow!("config validation failed: {}", messages.join("; ")))
        }
    }
}

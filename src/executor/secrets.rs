use std::{collections::BTreeMap, env, fmt};

use async_trait::async_trait;

/// Credentials forwarded to the reasoning process through its environment.
/// `Debug` lists names only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    values: BTreeMap<String, String>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn resolve(&self) -> Secrets;
}

/// Reads the configured variable names from the host environment. Missing
/// variables are skipped.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider {
    names: Vec<String>,
}

impl EnvSecretProvider {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn resolve(&self) -> Secrets {
        let mut secrets = Secrets::new();
        for name in &self.names {
            match env::var(name) {
                Ok(value) => secrets.insert(name.clone(), value),
                Err(_) => {
                    tracing::debug!(target: "executor", secret = %name, "secret_env_missing");
                }
            }
        }
        secrets
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticSecretProvider {
    secrets: Secrets,
}

impl StaticSecretProvider {
    pub fn new(secrets: Secrets) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn resolve(&self) -> Secrets {
        self.secrets.clone()
    }
}

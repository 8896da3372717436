use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::forensic::types::{ForensicEntry, ForensicWriteError};

/// Durable destination for forensic entries. Implementations only append.
#[async_trait]
pub trait ForensicSink: Send + Sync {
    async fn persist(&self, entry: &ForensicEntry) -> Result<(), ForensicWriteError>;
}

/// Newline-delimited JSON file, one entry per line, synced after each append.
#[derive(Debug, Clone)]
pub struct JsonlFileSink {
    path: PathBuf,
}

impl JsonlFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ForensicWriteError {
        ForensicWriteError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl ForensicSink for JsonlFileSink {
    async fn persist(&self, entry: &ForensicEntry) -> Result<(), ForensicWriteError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        if let Some(parent) = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        file.write_all(&line)
            .await
            .map_err(|err| self.io_error(err))?;
        file.sync_data().await.map_err(|err| self.io_error(err))?;

        Ok(())
    }
}

/// Reads back a JSONL forensic log; a missing file is an empty log.
pub fn load_entries(path: &Path) -> Result<Vec<ForensicEntry>, ForensicWriteError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ForensicWriteError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(ForensicWriteError::from))
        .collect()
}

#[derive(Debug, Default)]
pub struct NoopForensicSink;

#[async_trait]
impl ForensicSink for NoopForensicSink {
    async fn persist(&self, _entry: &ForensicEntry) -> Result<(), ForensicWriteError> {
        Ok(())
    }
}

/// Keeps entries in memory; used by embedders that ship the trail elsewhere
/// and by tests.
#[derive(Debug, Default)]
pub struct MemoryForensicSink {
    entries: Mutex<Vec<ForensicEntry>>,
}

impl MemoryForensicSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ForensicEntry> {
        self.entries.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ForensicSink for MemoryForensicSink {
    async fn persist(&self, entry: &ForensicEntry) -> Result<(), ForensicWriteError> {
        self.entries
            .lock()
            .expect("lock poisoned")
            .push(entry.clone());
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::errors::{DroidClawError, DroidClawResult};

/// Flat file store the agent may read and write. Names are validated by the
/// caller before they reach an implementation.
#[async_trait]
pub trait FileSandbox: Send + Sync {
    async fn read(&self, name: &str) -> DroidClawResult<String>;

    async fn write(&self, name: &str, content: &str) -> DroidClawResult<bool>;

    async fn append(&self, name: &str, content: &str) -> DroidClawResult<bool>;
}

/// [`FileSandbox`] over a single workspace directory.
pub struct WorkspaceFiles {
    root: PathBuf,
}

impl WorkspaceFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn ensure_root(&self) -> DroidClawResult<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            DroidClawError::Sandbox(format!(
                "workspace {} is not available: {e}",
                self.root.display()
            ))
        })
    }
}

#[async_trait]
impl FileSandbox for WorkspaceFiles {
    async fn read(&self, name: &str) -> DroidClawResult<String> {
        let path = self.root.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DroidClawError::Sandbox(
                format!("File '{name}' does not exist in the workspace"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, name: &str, content: &str) -> DroidClawResult<bool> {
        self.ensure_root().await?;
        tokio::fs::write(self.root.join(name), content).await?;
        tracing::debug!(file = name, bytes = content.len(), "workspace file written");
        Ok(true)
    }

    async fn append(&self, name: &str, content: &str) -> DroidClawResult<bool> {
        self.ensure_root().await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(name))
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(true)
    }
}

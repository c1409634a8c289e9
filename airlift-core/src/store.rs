//! Byte access for uploaded files.
//!
//! The upload flow hands the core logical file references; this seam resolves
//! them to bytes. Where the bytes actually live (and any retention policy) is
//! the storage service's business, not ours.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError>;
    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;
    /// Resolve a logical reference to a local filesystem path.
    fn resolve(&self, path: &str) -> PathBuf;
}

/// Stores files under a root directory. Absolute references pass through
/// untouched; relative ones are joined under the root.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFileStore { root: root.into() }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        Ok(tokio::fs::read(self.resolve(path)).await?)
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, data).await?;
        Ok(())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }
}

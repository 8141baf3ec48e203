// Per-document working copies on disk, one file per fingerprint.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, Clone)]
pub struct WorkingCopies {
    root: PathBuf,
}

impl WorkingCopies {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.root.join(fingerprint)
    }

    pub async fn write(&self, fingerprint: &str, text: &str) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(fingerprint), text).await
    }

    pub async fn read(&self, fingerprint: &str) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(fingerprint)).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn exists(&self, fingerprint: &str) -> io::Result<bool> {
        tokio::fs::try_exists(self.path_for(fingerprint)).await
    }

    /// Returns `false` when there was no working copy.
    pub async fn remove(&self, fingerprint: &str) -> io::Result<bool> {
        match tokio::fs::remove_file(self.path_for(fingerprint)).await {
            Ok(()) => {
                debug!(fingerprint, "removed working copy");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

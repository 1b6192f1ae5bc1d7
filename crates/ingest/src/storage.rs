use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tracing::{debug, info, warn};

use crate::naming::FilenamePolicy;

/// Attempts at finding an unused stored name before giving up.
const MAX_NAME_ATTEMPTS: usize = 8;

/// The destination directory; its listing is the only index of stored files.
#[derive(Debug, Clone)]
pub struct UploadDirectory {
    root: PathBuf,
}

impl UploadDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the directory if needed. Safe to call concurrently.
    pub async fn ensure(&self) -> io::Result<()> {
        if tokio::fs::metadata(&self.root).await.is_ok_and(|m| m.is_dir()) {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.root).await?;
        info!(path = %self.root.display(), "created upload directory");
        Ok(())
    }

    /// Creates a new, previously nonexistent file for `original`.
    ///
    /// Returns the stored name, its path and the open handle.
    pub async fn create_unique(
        &self,
        policy: &FilenamePolicy,
        original: &str,
    ) -> io::Result<(String, PathBuf, File)> {
        self.ensure().await?;
        let mut last_err = None;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = policy.stored_name(original);
            let path = self.root.join(&name);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((name, path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(name = %name, "stored name taken, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| io::Error::other("no unique name available")))
    }

    /// Best-effort removal of a partially written file.
    pub async fn remove_partial(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove partial file");
        }
    }

    /// Names of the regular files in the directory, sorted.
    ///
    /// A missing directory lists as empty.
    pub async fn list(&self) -> io::Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

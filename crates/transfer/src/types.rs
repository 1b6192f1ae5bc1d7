use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::validation::TransferLimits;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// How the request body is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// One file as a bare `application/octet-stream` body.
    Raw,
    /// Metadata plus N files in a `multipart/form-data` envelope.
    Multipart,
}

/// A source file inspected on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Final path component, as sent on the wire.
    pub file_name: String,
    pub size: u64,
}

impl SourceFile {
    /// Reads the file's metadata; the path must exist and be a regular file.
    pub async fn inspect(path: &Path) -> Result<Self, TransferError> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::SourceMissing(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(TransferError::NotAFile(path.to_path_buf()));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::InvalidName(path.display().to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            size: meta.len(),
        })
    }
}

/// A validated upload, ready to be encoded.
///
/// Only [`TransferRequest::prepare`] builds one, so holding a request means
/// every source exists and the limits passed.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    sources: Vec<SourceFile>,
    endpoint: Url,
    metadata: Option<serde_json::Value>,
    chunk_size: usize,
    limits: TransferLimits,
    total_size: u64,
}

impl TransferRequest {
    /// Inspects every path in order, then validates sizes against `limits`.
    ///
    /// No network I/O happens here; a failure means nothing was sent.
    pub async fn prepare(
        paths: &[PathBuf],
        endpoint: Url,
        metadata: Option<serde_json::Value>,
        chunk_size: usize,
        limits: TransferLimits,
    ) -> Result<Self, TransferError> {
        if paths.is_empty() {
            return Err(TransferError::NoSources);
        }

        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            sources.push(SourceFile::inspect(path).await?);
        }

        let total_size = limits.validate(sources.iter().map(|s| (s.path.as_path(), s.size)))?;
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };

        debug!(
            files = sources.len(),
            total_size,
            chunk_size,
            endpoint = %endpoint,
            "transfer request validated"
        );

        Ok(Self {
            sources,
            endpoint,
            metadata,
            chunk_size,
            limits,
            total_size,
        })
    }

    pub fn sources(&self) -> &[SourceFile] {
        &self.sources
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn limits(&self) -> TransferLimits {
        self.limits
    }

    /// Sum of all source sizes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

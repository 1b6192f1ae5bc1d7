//! Bounded-memory encoders for streaming uploads.
//!
//! A file is never materialised in memory: [`ChunkEncoder`] reads it in
//! fixed-size chunks, [`MultipartEnvelope`] splices those chunks between
//! boundary-delimited part headers, and [`TransferLimits`] rejects oversized
//! input before a single byte reaches the network.

mod chunked;
mod content_type;
mod memory;
mod multipart;
mod progress;
mod types;
mod validation;

use std::path::PathBuf;

pub use chunked::{ChunkEncoder, ChunkStream};
pub use content_type::{content_type_or_default, detect_content_type};
pub use memory::{DEFAULT_MEMORY_WARN_BYTES, MemorySampler};
pub use multipart::{ByteSource, FieldPart, FilePart, MultipartEnvelope, Part, generate_boundary};
pub use progress::{ProgressCallback, ProgressEvent, ProgressGate, SpeedCalculator};
pub use types::{SourceFile, TransferMode, TransferRequest};
pub use validation::{LimitError, TransferLimits, validate_upload_name};

pub use filestream_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Coarse failure category shared by every error type in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing input, size ceilings, malformed metadata.
    Validation,
    /// Connection, timeout or mid-stream I/O failure.
    Transport,
    /// Disk write failure on the receiving side.
    Persistence,
}

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("path is not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("source ended after {actual} of {expected} bytes")]
    SourceTruncated { expected: u64, actual: u64 },

    #[error(transparent)]
    Limit(#[from] LimitError),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("at least one source file is required")]
    NoSources,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::SourceTruncated { .. } => ErrorKind::Transport,
            Self::SourceMissing(_)
            | Self::NotAFile(_)
            | Self::Limit(_)
            | Self::InvalidName(_)
            | Self::NoSources => ErrorKind::Validation,
        }
    }
}

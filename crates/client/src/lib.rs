//! Streaming upload client.
//!
//! [`Uploader`] validates sources with [`TransferRequest`], encodes them with
//! the transfer crate's encoders, streams the body through
//! [`StreamingTransport`] and interprets the reply with the response decoder.

pub mod config;
pub mod response;
pub mod transport;
mod uploader;

#[cfg(test)]
mod test_support;

use filestream_protocol::FileInfo;
use filestream_transfer::{ErrorKind, TransferError};

pub use config::{ClientConfig, ConfigError};
pub use response::{DecodedResponse, ResponseBody, ResponseChannel, ResponseSummary, decode_parts};
pub use transport::{OutboundBody, StreamingTransport};
pub use uploader::{Uploader, default_metadata};

pub use filestream_transfer::TransferRequest;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub http_status: u16,
    pub message: String,
    pub files: Vec<FileInfo>,
    pub total_bytes: u64,
    /// `fileCount` reported by the multipart endpoints.
    pub file_count: Option<u64>,
    /// Stored name reported by the raw endpoint.
    pub saved_filename: Option<String>,
}

/// Errors returned by the upload client.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Rejected before any network I/O.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("transfer failed after {sent} bytes: {source}")]
    Transport {
        sent: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("transfer timed out after {sent} bytes")]
    Timeout { sent: u64 },

    #[error("server returned {status}: {body}")]
    Server {
        status: u16,
        /// `error` field of the body, if any.
        error: Option<String>,
        body: ResponseBody,
    },

    #[error("invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Client(reqwest::Error),
}

impl UploadError {
    /// Maps a reqwest failure, keeping the count of bytes already sent.
    pub fn from_reqwest(err: reqwest::Error, sent: u64) -> Self {
        if err.is_timeout() || has_timed_out_source(&err) {
            Self::Timeout { sent }
        } else {
            Self::Transport { sent, source: err }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transfer(e) => e.kind(),
            Self::Transport { .. } | Self::Timeout { .. } | Self::Client(_) => ErrorKind::Transport,
            Self::Server { status, .. } if *status >= 500 => ErrorKind::Persistence,
            Self::Server { .. } | Self::Metadata(_) => ErrorKind::Validation,
        }
    }

    /// Bytes handed to the connection before a transport failure.
    pub fn bytes_sent(&self) -> Option<u64> {
        match self {
            Self::Transport { sent, .. } | Self::Timeout { sent } => Some(*sent),
            _ => None,
        }
    }
}

fn has_timed_out_source(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = e.source();
    }
    false
}

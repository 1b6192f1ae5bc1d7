use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::{FileInfo, UploadMetadata, now_local, timestamp};

// ---------------------------------------------------------------------------
// Success bodies
// ---------------------------------------------------------------------------

/// Response of the multipart upload endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<FileInfo>,
    pub metadata: UploadMetadata,
    pub total_size: u64,
    pub file_count: usize,
    #[serde(with = "timestamp")]
    pub uploaded_at: NaiveDateTime,
}

impl UploadResponse {
    /// Builds a response, deriving `fileCount` and `totalSize` from `files`.
    pub fn new(message: impl Into<String>, files: Vec<FileInfo>, metadata: UploadMetadata) -> Self {
        let total_size = files.iter().map(|f| f.size).sum();
        Self {
            message: message.into(),
            file_count: files.len(),
            total_size,
            files,
            metadata,
            uploaded_at: now_local(),
        }
    }
}

/// Response of the raw octet-stream upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUploadResponse {
    pub message: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_filename: Option<String>,
}

// ---------------------------------------------------------------------------
// Error bodies
// ---------------------------------------------------------------------------

/// Error body of the multipart API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>, status: u16) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status,
            timestamp: chrono::Local::now()
                .naive_local()
                .format("%Y-%m-%dT%H:%M:%S%.3f")
                .to_string(),
        }
    }
}

/// Error body of the raw API (a single `error` string).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawErrorResponse {
    pub error: String,
}

impl RawErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

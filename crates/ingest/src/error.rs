use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use filestream_protocol::{ErrorResponse, RawErrorResponse};
use filestream_transfer::ErrorKind;

/// Errors raised while ingesting a request.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Filename parameter is missing.")]
    MissingFilename,

    #[error("invalid file name: {0}")]
    InvalidFilename(String),

    #[error("Metadata JSON is malformed: {0}")]
    InvalidJson(String),

    #[error("Description and category are required")]
    MissingRequiredFields,

    #[error("Required part 'metadata' is not present")]
    MissingMetadata,

    #[error("Metadata part must come once, before any file part")]
    MetadataOutOfOrder,

    #[error("At least one file must be provided")]
    NoFiles,

    #[error("File cannot be empty")]
    EmptyFile,

    #[error("Content-Type must be multipart/form-data with a boundary")]
    MissingBoundary,

    #[error("Request exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error("Malformed multipart body: {0}")]
    Multipart(multer::Error),

    #[error("Failed to read request body: {0}")]
    Body(String),

    #[error("Failed to save files: {source}")]
    Persist {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list files: {0}")]
    Listing(std::io::Error),
}

impl From<multer::Error> for IngestError {
    fn from(err: multer::Error) -> Self {
        match err {
            multer::Error::StreamSizeExceeded { limit }
            | multer::Error::FieldSizeExceeded { limit, .. } => Self::PayloadTooLarge { limit },
            multer::Error::StreamReadFailed(e) => Self::Body(e.to_string()),
            other => Self::Multipart(other),
        }
    }
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Body(_) => ErrorKind::Transport,
            Self::Persist { .. } | Self::Listing(_) => ErrorKind::Persistence,
            _ => ErrorKind::Validation,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Persist { .. } | Self::Listing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Short error label used in the `error` field of multipart responses.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "Invalid JSON",
            Self::MissingRequiredFields | Self::MissingMetadata | Self::MetadataOutOfOrder => {
                "Validation Error"
            }
            Self::NoFiles => "No Files",
            Self::EmptyFile => "Empty File",
            Self::MissingFilename | Self::InvalidFilename(_) => "Invalid Filename",
            Self::MissingBoundary | Self::Multipart(_) => "Bad Request",
            Self::PayloadTooLarge { .. } => "Payload Too Large",
            Self::Body(_) => "Request Body Error",
            Self::Persist { .. } => "Upload Error",
            Self::Listing(_) => "List Error",
        }
    }

    fn log(&self) {
        match self.kind() {
            ErrorKind::Persistence => error!(error = %self, "request failed"),
            _ => warn!(error = %self, "request rejected"),
        }
    }

    /// Body in the `{error, message, status, timestamp}` shape.
    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse::new(self.label(), self.to_string(), self.status().as_u16())
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        self.log();
        (self.status(), Json(self.to_body())).into_response()
    }
}

/// Wraps an [`IngestError`] for the raw API, whose errors carry a single
/// `error` string.
#[derive(Debug)]
pub struct RawApiError(pub IngestError);

impl From<IngestError> for RawApiError {
    fn from(err: IngestError) -> Self {
        Self(err)
    }
}

impl IntoResponse for RawApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        err.log();
        let message = match &err {
            IngestError::Persist { .. } => "Failed to save file on server.".to_string(),
            IngestError::Listing(_) => "Failed to list files.".to_string(),
            IngestError::Body(_) => "Unexpected error occurred.".to_string(),
            other => other.to_string(),
        };
        (err.status(), Json(RawErrorResponse::new(message))).into_response()
    }
}

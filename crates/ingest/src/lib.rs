//! Streaming upload ingest server.
//!
//! Accepts raw octet-stream and `multipart/form-data` uploads, streams every
//! file to disk through a bounded write buffer and stores it under a
//! collision-resistant name. The destination directory is the only index:
//! listings read it directly.

pub mod config;
pub mod error;
pub mod naming;
pub mod pipeline;
pub mod routes;
pub mod server;
pub mod storage;

pub use config::{ConfigError, ServerConfig};
pub use error::{IngestError, RawApiError};
pub use naming::FilenamePolicy;
pub use pipeline::{IngestPipeline, IngestState, IngestedFile};
pub use routes::router;
pub use server::IngestServer;
pub use storage::UploadDirectory;

/// Errors produced by the ingest server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot prepare upload directory: {0}")]
    UploadDir(std::io::Error),
}

//! Wire types shared by the filestream client and ingest server.
//!
//! Every JSON body exchanged over HTTP is defined here so both sides agree on
//! field names (`camelCase`) and timestamp formats.

pub mod constants;
pub mod messages;
pub mod types;

pub use messages::{ErrorResponse, RawErrorResponse, RawUploadResponse, UploadResponse};
pub use types::{FileInfo, UploadMetadata};

//! Endpoint paths, form field names and default limits.

/// Base path of the raw (single octet-stream) upload API.
pub const RAW_API_BASE: &str = "/api/v1/files";

/// Base path of the multipart upload API.
pub const MULTIPART_API_BASE: &str = "/api/v1/multipart";

/// Query parameter carrying the original file name in raw mode.
pub const FILENAME_PARAM: &str = "filename";

/// Multipart field holding the JSON metadata document.
pub const METADATA_FIELD: &str = "metadata";

/// Multipart field (repeated) holding the uploaded files.
pub const FILES_FIELD: &str = "files";

/// Multipart field of the single-file endpoint.
pub const FILE_FIELD: &str = "file";

/// Fallback content type for unknown extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content type of metadata text parts.
pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=UTF-8";

/// Default chunk / buffer size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default connection-establishment timeout.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Default read/response timeout.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 60_000;

/// Default per-file ceiling for multipart uploads (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Default per-file ceiling for raw uploads (1 GiB).
pub const DEFAULT_RAW_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Default per-request ceiling (500 MiB).
pub const DEFAULT_MAX_REQUEST_SIZE: u64 = 500 * 1024 * 1024;

/// Default destination directory on the server.
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";

/// Timestamp format used in JSON bodies (`yyyy-MM-dd HH:mm:ss`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

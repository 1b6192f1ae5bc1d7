use std::path::Path;

use filestream_protocol::constants::OCTET_STREAM;

/// Guesses a MIME type from a file name's extension.
pub fn detect_content_type(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("txt" | "log") => Some("text/plain"),
        Some("html" | "htm") => Some("text/html"),
        Some("css") => Some("text/css"),
        Some("csv") => Some("text/csv"),
        Some("md") => Some("text/markdown"),
        Some("xml") => Some("application/xml"),
        Some("json") => Some("application/json"),
        Some("js") => Some("text/javascript"),
        Some("pdf") => Some("application/pdf"),
        Some("zip") => Some("application/zip"),
        Some("gz" | "tgz") => Some("application/gzip"),
        Some("tar") => Some("application/x-tar"),
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("gif") => Some("image/gif"),
        Some("webp") => Some("image/webp"),
        Some("svg") => Some("image/svg+xml"),
        Some("ico") => Some("image/x-icon"),
        Some("mp3") => Some("audio/mpeg"),
        Some("wav") => Some("audio/wav"),
        Some("mp4") => Some("video/mp4"),
        Some("webm") => Some("video/webm"),
        _ => None,
    }
}

/// Like [`detect_content_type`], falling back to `application/octet-stream`.
pub fn content_type_or_default(file_name: &str) -> &'static str {
    detect_content_type(file_name).unwrap_or(OCTET_STREAM)
}

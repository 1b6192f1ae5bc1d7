//! Classification and lenient parsing of upload responses.

use serde_json::Value;

use filestream_protocol::FileInfo;

use crate::{TransferOutcome, UploadError};

/// Which channel a response arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseChannel {
    /// Status below 400.
    Success,
    /// Status 400 or above.
    Error,
}

impl ResponseChannel {
    pub fn for_status(status: u16) -> Self {
        if status >= 400 {
            Self::Error
        } else {
            Self::Success
        }
    }
}

/// A response body, parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    /// Body that is not valid JSON, kept verbatim.
    Text(String),
    Empty,
}

impl ResponseBody {
    /// Parses `bytes` as JSON, falling back to lossy UTF-8 text.
    pub fn parse(bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Self::Empty;
        }
        match serde_json::from_slice(bytes) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(v) => write!(f, "{v}"),
            Self::Text(t) => f.write_str(t),
            Self::Empty => f.write_str("<empty>"),
        }
    }
}

/// Summary fields picked out of a JSON body. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseSummary {
    pub message: Option<String>,
    pub error: Option<String>,
    pub file_count: Option<u64>,
    pub total_size: Option<u64>,
    /// Byte count reported by the raw endpoint.
    pub size: Option<u64>,
    pub saved_filename: Option<String>,
    pub files: Vec<FileInfo>,
}

impl ResponseSummary {
    fn extract(body: &ResponseBody) -> Self {
        let Some(Value::Object(map)) = body.as_json() else {
            return Self::default();
        };
        let string = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
        let number = |key: &str| map.get(key).and_then(Value::as_u64);

        // Entries that do not look like file records are dropped, not fatal.
        let files = map
            .get("files")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| serde_json::from_value::<FileInfo>(e.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            message: string("message"),
            error: string("error"),
            file_count: number("fileCount"),
            total_size: number("totalSize"),
            size: number("size"),
            saved_filename: string("savedFilename"),
            files,
        }
    }
}

/// A fully read and classified response.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse {
    pub status: u16,
    pub channel: ResponseChannel,
    pub body: ResponseBody,
    pub summary: ResponseSummary,
}

impl DecodedResponse {
    /// Turns a success response into a [`TransferOutcome`], or an error
    /// response into [`UploadError::Server`].
    pub fn into_outcome(self) -> Result<TransferOutcome, UploadError> {
        if self.channel == ResponseChannel::Error {
            return Err(UploadError::Server {
                status: self.status,
                error: self.summary.error.clone(),
                body: self.body,
            });
        }

        let summary = self.summary;
        let total_bytes = summary
            .total_size
            .or(summary.size)
            .unwrap_or_else(|| summary.files.iter().map(|f| f.size).sum());
        let message = summary
            .message
            .unwrap_or_else(|| match &self.body {
                ResponseBody::Text(t) => t.clone(),
                _ => String::new(),
            });

        Ok(TransferOutcome {
            http_status: self.status,
            message,
            files: summary.files,
            total_bytes,
            file_count: summary.file_count,
            saved_filename: summary.saved_filename,
        })
    }
}

/// Decodes a status and a fully read body.
pub fn decode_parts(status: u16, bytes: &[u8]) -> DecodedResponse {
    let body = ResponseBody::parse(bytes);
    let summary = ResponseSummary::extract(&body);
    DecodedResponse {
        status,
        channel: ResponseChannel::for_status(status),
        body,
        summary,
    }
}

/// Reads `response` to the end and decodes it.
///
/// `sent` is the number of body bytes already handed to the connection; it
/// is reported if reading the response fails.
pub async fn decode(response: reqwest::Response, sent: u64) -> Result<DecodedResponse, UploadError> {
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| UploadError::from_reqwest(e, sent))?;
    let decoded = decode_parts(status, &bytes);
    tracing::debug!(
        status,
        channel = ?decoded.channel,
        bytes = bytes.len(),
        "response decoded"
    );
    Ok(decoded)
}

//! HTTP transport whose request body is produced incrementally.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::{debug, info, warn};
use url::Url;

use filestream_protocol::constants::{FILENAME_PARAM, OCTET_STREAM};
use filestream_transfer::{ChunkStream, MultipartEnvelope, ProgressCallback};

use crate::config::ClientConfig;
use crate::response::{self, DecodedResponse};
use crate::UploadError;

/// A body ready to be sent: its chunk stream plus the headers describing it.
pub struct OutboundBody {
    content_type: String,
    content_length: Option<u64>,
    chunks: ChunkStream,
}

impl OutboundBody {
    /// A raw `application/octet-stream` body of exactly `len` bytes.
    pub fn raw(chunks: ChunkStream, len: u64) -> Self {
        Self {
            content_type: OCTET_STREAM.to_string(),
            content_length: Some(len),
            chunks,
        }
    }

    /// A `multipart/form-data` body, streamed without a declared length.
    pub fn multipart(
        envelope: MultipartEnvelope,
        chunk_size: usize,
        on_progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            content_type: envelope.content_type(),
            content_length: None,
            chunks: envelope.into_stream(chunk_size, on_progress),
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

/// Sends one streamed POST per call and decodes the reply.
///
/// The underlying connection is owned by a single in-flight request; nothing
/// is retried on failure.
#[derive(Clone)]
pub struct StreamingTransport {
    http: reqwest::Client,
}

impl StreamingTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()
            .map_err(UploadError::Client)?;
        Ok(Self { http })
    }

    /// Appends `?filename=` to a raw upload endpoint.
    pub fn raw_url(endpoint: &Url, file_name: &str) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut().append_pair(FILENAME_PARAM, file_name);
        url
    }

    /// Streams `body` to `url` and returns the decoded response.
    pub async fn send(&self, url: Url, body: OutboundBody) -> Result<DecodedResponse, UploadError> {
        let sent = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&sent);
        let chunks = body.chunks.inspect_ok(move |chunk| {
            counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        });

        let mut request = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, &body.content_type)
            .body(reqwest::Body::wrap_stream(chunks));
        // An explicit length makes the connection frame the body by length
        // instead of chunked transfer-encoding.
        if let Some(len) = body.content_length {
            request = request.header(CONTENT_LENGTH, len);
        }

        debug!(url = %url, content_type = %body.content_type, "sending request");
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                let sent = sent.load(Ordering::Relaxed);
                warn!(url = %url, sent, error = %e, "transfer failed");
                return Err(UploadError::from_reqwest(e, sent));
            }
        };

        let sent = sent.load(Ordering::Relaxed);
        info!(url = %url, status = response.status().as_u16(), sent, "request completed");
        response::decode(response, sent).await
    }

    /// Issues a GET and decodes the reply.
    pub async fn get(&self, url: Url) -> Result<DecodedResponse, UploadError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| UploadError::from_reqwest(e, 0))?;
        response::decode(response, 0).await
    }
}

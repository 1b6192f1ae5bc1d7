use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::info;
use url::Url;

use filestream_protocol::FileInfo;
use filestream_protocol::constants::{FILES_FIELD, METADATA_FIELD, OCTET_STREAM};
use filestream_transfer::{
    ChunkEncoder, FieldPart, FilePart, MemorySampler, MultipartEnvelope, ProgressCallback,
    SourceFile, TransferError, TransferMode, TransferRequest, generate_boundary,
};

use crate::config::ClientConfig;
use crate::response::ResponseChannel;
use crate::transport::{OutboundBody, StreamingTransport};
use crate::{TransferOutcome, UploadError};

/// Metadata sent when the caller supplies none.
pub fn default_metadata(sources: &[SourceFile]) -> Value {
    json!({
        "description": format!("Multipart upload: {} files", sources.len()),
        "category": "multipart-upload",
        "uploadedBy": "filestream-upload",
        "tags": ["rust", "multipart", "streaming"],
        "customFields": {
            "client": "filestream-client",
            "fileCount": sources.len(),
        },
    })
}

/// Orchestrates validation, encoding and transport for one upload at a time.
#[derive(Clone)]
pub struct Uploader {
    config: ClientConfig,
    transport: StreamingTransport,
    on_progress: Option<ProgressCallback>,
    memory: Arc<MemorySampler>,
}

impl Uploader {
    pub fn new(config: ClientConfig) -> Result<Self, UploadError> {
        let transport = StreamingTransport::new(&config)?;
        let memory = Arc::new(MemorySampler::new(config.memory_warn_threshold));
        Ok(Self {
            config,
            transport,
            on_progress: None,
            memory,
        })
    }

    /// Registers a callback receiving per-file progress events.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The caller's callback, sampling memory on every 20-point step.
    fn progress(&self) -> ProgressCallback {
        Arc::clone(&self.memory).progress_hook(self.on_progress.clone())
    }

    /// Validates `path` against the raw limits and uploads it as a bare
    /// octet-stream body to `endpoint?filename=<name>`.
    pub async fn upload_raw(&self, path: &Path, endpoint: &Url) -> Result<TransferOutcome, UploadError> {
        let request = TransferRequest::prepare(
            &[path.to_path_buf()],
            endpoint.clone(),
            None,
            self.config.chunk_size,
            self.config.limits_for(TransferMode::Raw),
        )
        .await?;
        self.send_raw(&request).await
    }

    /// Sends the first source of an already validated request in raw mode.
    pub async fn send_raw(&self, request: &TransferRequest) -> Result<TransferOutcome, UploadError> {
        let source = request.sources().first().ok_or(TransferError::NoSources)?;
        let file = tokio::fs::File::open(&source.path)
            .await
            .map_err(TransferError::from)?;

        let encoder = ChunkEncoder::new(file, source.size, request.chunk_size())
            .with_file_name(source.file_name.as_str())
            .on_progress(self.progress());

        info!(
            file = %source.file_name,
            size = source.size,
            chunk_size = request.chunk_size(),
            "starting raw upload"
        );
        self.memory.record("before upload");
        let url = StreamingTransport::raw_url(request.endpoint(), &source.file_name);
        let body = OutboundBody::raw(encoder.into_stream(), source.size);
        let mut outcome = self.transport.send(url, body).await?.into_outcome()?;
        self.memory.record("upload completed");

        if outcome.files.is_empty() {
            outcome.files.push(FileInfo {
                original_filename: source.file_name.clone(),
                saved_filename: outcome.saved_filename.clone().unwrap_or_default(),
                content_type: Some(OCTET_STREAM.to_string()),
                size: outcome.total_bytes,
                path: String::new(),
            });
        }
        Ok(outcome)
    }

    /// Validates `paths` against the multipart limits and uploads them in
    /// one envelope, metadata first.
    pub async fn upload_multipart(
        &self,
        paths: &[PathBuf],
        endpoint: &Url,
        metadata: Option<Value>,
    ) -> Result<TransferOutcome, UploadError> {
        let request = TransferRequest::prepare(
            paths,
            endpoint.clone(),
            metadata,
            self.config.chunk_size,
            self.config.limits_for(TransferMode::Multipart),
        )
        .await?;
        self.send_multipart(&request).await
    }

    /// Sends an already validated request as a multipart envelope.
    pub async fn send_multipart(&self, request: &TransferRequest) -> Result<TransferOutcome, UploadError> {
        let metadata = match request.metadata() {
            Some(value) => serde_json::to_string(value)?,
            None => serde_json::to_string(&default_metadata(request.sources()))?,
        };

        let files = request
            .sources()
            .iter()
            .map(|s| FilePart::from_path(FILES_FIELD, &s.path, s.size))
            .collect();
        let envelope = MultipartEnvelope::build(
            vec![FieldPart::new(METADATA_FIELD, metadata)],
            files,
            generate_boundary(),
        );

        info!(
            files = request.sources().len(),
            total_size = request.total_size(),
            boundary = %envelope.boundary(),
            "starting multipart upload"
        );
        self.memory.record("before upload");
        let body = OutboundBody::multipart(envelope, request.chunk_size(), Some(self.progress()));
        let outcome = self
            .transport
            .send(request.endpoint().clone(), body)
            .await?
            .into_outcome()?;
        self.memory.record("upload completed");
        Ok(outcome)
    }

    /// Fetches the stored file names from a listing endpoint.
    pub async fn list_files(&self, url: &Url) -> Result<Vec<String>, UploadError> {
        let decoded = self.transport.get(url.clone()).await?;
        if decoded.channel == ResponseChannel::Error {
            return decoded.into_outcome().map(|_| Vec::new());
        }
        let names = decoded
            .body
            .as_json()
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }
}

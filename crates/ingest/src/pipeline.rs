//! Server-side ingest: read a request body in bounded buffers and persist
//! each file under a collision-proof name.
//!
//! A multipart request moves through [`IngestState`]:
//! `AwaitMetadata -> AwaitFiles -> Finalizing -> Done`. The metadata part
//! must be fully read and validated before the first file part is opened.
//! Raw requests skip `AwaitMetadata`.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use filestream_protocol::constants::{FILES_FIELD, FILE_FIELD, METADATA_FIELD};
use filestream_protocol::{FileInfo, UploadMetadata, UploadResponse};
use filestream_transfer::{MemorySampler, validate_upload_name};

use crate::config::{ConfigError, ServerConfig};
use crate::error::IngestError;
use crate::naming::{FilenamePolicy, clean_original};
use crate::storage::UploadDirectory;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Per-request progress of a multipart ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    AwaitMetadata,
    AwaitFiles,
    Finalizing,
    Done,
}

/// A file as observed and stored by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedFile {
    pub original_filename: String,
    pub stored_filename: String,
    pub content_type: Option<String>,
    pub byte_count: u64,
    pub storage_path: PathBuf,
}

impl From<IngestedFile> for FileInfo {
    fn from(f: IngestedFile) -> Self {
        Self {
            original_filename: f.original_filename,
            saved_filename: f.stored_filename,
            content_type: f.content_type,
            size: f.byte_count,
            path: f.storage_path.display().to_string(),
        }
    }
}

/// Reads request bodies and persists their files.
#[derive(Debug, Clone)]
pub struct IngestPipeline {
    dir: UploadDirectory,
    policy: FilenamePolicy,
    buffer_size: usize,
    max_file_size: u64,
    raw_max_file_size: u64,
    max_request_size: u64,
    max_metadata_size: u64,
    memory: Arc<MemorySampler>,
}

impl IngestPipeline {
    pub fn new(config: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            dir: UploadDirectory::new(&config.upload_dir),
            policy: config.filename_policy()?,
            buffer_size: config.buffer_size.max(1),
            max_file_size: config.max_file_size,
            raw_max_file_size: config.raw_max_file_size,
            max_request_size: config.max_request_size,
            max_metadata_size: config.max_metadata_size,
            memory: Arc::new(MemorySampler::new(config.memory_warn_threshold)),
        })
    }

    pub fn upload_dir(&self) -> &UploadDirectory {
        &self.dir
    }

    /// Stored file names, regular files only.
    pub async fn list(&self) -> Result<Vec<String>, IngestError> {
        self.dir.list().await.map_err(IngestError::Listing)
    }

    // -----------------------------------------------------------------------
    // Raw
    // -----------------------------------------------------------------------

    /// Stores a bare octet-stream body under the name given in `filename`.
    ///
    /// An empty body is stored as an empty file.
    pub async fn ingest_raw<S, E>(&self, filename: Option<&str>, body: S) -> Result<IngestedFile, IngestError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Into<BoxError>,
    {
        let filename = filename.ok_or(IngestError::MissingFilename)?;
        validate_upload_name(filename).map_err(|e| IngestError::InvalidFilename(e.to_string()))?;
        self.memory.record("upload start");

        let mut body = body.map(|r| r.map_err(|e| IngestError::Body(e.into().to_string())));
        let mut state = IngestState::AwaitFiles;
        let (stored, path, file) = self
            .dir
            .create_unique(&self.policy, filename)
            .await
            .map_err(|source| IngestError::Persist {
                file: filename.to_string(),
                source,
            })?;
        debug!(file = %filename, stored = %stored, ?state, "raw ingest started");

        let written = self
            .write_body(&path, file, filename, None, &mut body, self.raw_max_file_size)
            .await?;

        state = IngestState::Done;
        info!(file = %filename, stored = %stored, bytes = written, ?state, "file stored");
        self.memory.record("upload completed");
        Ok(IngestedFile {
            original_filename: filename.to_string(),
            stored_filename: stored,
            content_type: None,
            byte_count: written,
            storage_path: path,
        })
    }

    // -----------------------------------------------------------------------
    // Multipart
    // -----------------------------------------------------------------------

    fn constraints(&self) -> multer::Constraints {
        multer::Constraints::new().size_limit(
            multer::SizeLimit::new()
                .whole_stream(self.max_request_size)
                .per_field(self.max_file_size)
                .for_field(METADATA_FIELD, self.max_metadata_size),
        )
    }

    /// Ingests a `metadata` part followed by one or more `files` parts.
    ///
    /// Empty files are skipped. Files stored before a failing part stay on
    /// disk.
    pub async fn ingest_multipart<S, O, E>(&self, body: S, boundary: &str) -> Result<UploadResponse, IngestError>
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
    {
        self.memory.record("upload start");
        let mut multipart = multer::Multipart::with_constraints(body, boundary, self.constraints());
        let mut state = IngestState::AwaitMetadata;
        let mut metadata = None;
        let mut file_parts = 0usize;
        let mut stored = Vec::new();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some(METADATA_FIELD) => {
                    if state != IngestState::AwaitMetadata {
                        return Err(IngestError::MetadataOutOfOrder);
                    }
                    let text = field.text().await?;
                    metadata = Some(parse_metadata(&text)?);
                    state = IngestState::AwaitFiles;
                    debug!(?state, "metadata accepted");
                }
                Some(FILES_FIELD) => {
                    if state != IngestState::AwaitFiles {
                        return Err(IngestError::MetadataOutOfOrder);
                    }
                    file_parts += 1;
                    if let Some(file) = self.persist_field(field).await? {
                        stored.push(file);
                    }
                }
                other => {
                    debug!(field = ?other, "ignoring unknown part");
                    drain(field).await?;
                }
            }
        }

        state = IngestState::Finalizing;
        debug!(?state, parts = file_parts, stored = stored.len(), "request body consumed");
        let metadata = metadata.ok_or(IngestError::MissingMetadata)?;
        if file_parts == 0 {
            return Err(IngestError::NoFiles);
        }

        let files: Vec<FileInfo> = stored.into_iter().map(FileInfo::from).collect();
        let response = UploadResponse::new(
            format!("Successfully uploaded {} files", files.len()),
            files,
            metadata,
        );
        state = IngestState::Done;
        info!(
            files = response.file_count,
            total_size = response.total_size,
            ?state,
            "multipart upload completed"
        );
        self.memory.record("upload completed");
        Ok(response)
    }

    /// Ingests a single `file` part with optional `metadata`, in any order.
    ///
    /// Missing or malformed metadata falls back to a default document.
    pub async fn ingest_single<S, O, E>(&self, body: S, boundary: &str) -> Result<UploadResponse, IngestError>
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
    {
        self.memory.record("upload start");
        let mut multipart = multer::Multipart::with_constraints(body, boundary, self.constraints());
        let mut metadata_text: Option<String> = None;
        let mut stored: Option<IngestedFile> = None;

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some(METADATA_FIELD) if metadata_text.is_none() => {
                    metadata_text = Some(field.text().await?);
                }
                Some(FILE_FIELD) if stored.is_none() => {
                    let file = self.persist_field(field).await?.ok_or(IngestError::EmptyFile)?;
                    stored = Some(file);
                }
                _ => drain(field).await?,
            }
        }

        let file = stored.ok_or(IngestError::NoFiles)?;
        let metadata = metadata_text
            .filter(|t| !t.trim().is_empty())
            .and_then(|t| match serde_json::from_str::<UploadMetadata>(&t) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!(error = %e, "malformed metadata, using defaults");
                    None
                }
            })
            .unwrap_or_else(|| default_single_metadata(&file.original_filename));

        let message = format!("File uploaded successfully: {}", file.original_filename);
        self.memory.record("upload completed");
        Ok(UploadResponse::new(message, vec![file.into()], metadata))
    }

    /// Streams one file part to disk. Returns `None` for an empty part.
    async fn persist_field(&self, mut field: multer::Field<'static>) -> Result<Option<IngestedFile>, IngestError> {
        let original = clean_original(field.file_name().unwrap_or_default());
        let content_type = field.content_type().map(|m| m.to_string());

        // Peek so that empty parts never create a file.
        let first = loop {
            match field.chunk().await? {
                Some(chunk) if chunk.is_empty() => continue,
                Some(chunk) => break chunk,
                None => {
                    warn!(file = %original, "skipping empty file");
                    return Ok(None);
                }
            }
        };

        let (stored, path, file) = self
            .dir
            .create_unique(&self.policy, &original)
            .await
            .map_err(|source| IngestError::Persist {
                file: original.clone(),
                source,
            })?;

        let rest = futures_util::stream::once(async move { Ok::<_, IngestError>(first) })
            .chain(futures_util::stream::unfold(field, |mut field| async move {
                match field.chunk().await {
                    Ok(Some(chunk)) => Some((Ok(chunk), field)),
                    Ok(None) => None,
                    Err(e) => Some((Err(IngestError::from(e)), field)),
                }
            }));
        let mut rest = Box::pin(rest);

        let written = self
            .write_body(&path, file, &original, content_type.as_deref(), &mut rest, self.max_file_size)
            .await?;

        info!(file = %original, stored = %stored, bytes = written, "file stored");
        self.memory.record("file stored");
        Ok(Some(IngestedFile {
            original_filename: original,
            stored_filename: stored,
            content_type,
            byte_count: written,
            storage_path: path,
        }))
    }

    /// Copies `body` into `file` through a `buffer_size` write buffer.
    ///
    /// On any failure the partial file is removed before the error is
    /// returned.
    async fn write_body<S>(
        &self,
        path: &std::path::Path,
        file: tokio::fs::File,
        original: &str,
        content_type: Option<&str>,
        body: &mut S,
        limit: u64,
    ) -> Result<u64, IngestError>
    where
        S: Stream<Item = Result<Bytes, IngestError>> + Unpin,
    {
        let mut writer = BufWriter::with_capacity(self.buffer_size, file);
        let persist = |source| IngestError::Persist {
            file: original.to_string(),
            source,
        };

        let result = async {
            let mut written: u64 = 0;
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                written += chunk.len() as u64;
                if written > limit {
                    return Err(IngestError::PayloadTooLarge { limit });
                }
                writer.write_all(&chunk).await.map_err(persist)?;
            }
            writer.flush().await.map_err(persist)?;
            Ok(written)
        }
        .await;

        if let Err(e) = &result {
            warn!(file = %original, content_type = ?content_type, error = %e, "discarding partial file");
            drop(writer);
            self.dir.remove_partial(path).await;
        }
        result
    }
}

/// Parses and validates the metadata part.
fn parse_metadata(text: &str) -> Result<UploadMetadata, IngestError> {
    let metadata: UploadMetadata =
        serde_json::from_str(text).map_err(|e| IngestError::InvalidJson(e.to_string()))?;
    if !metadata.has_required_fields() {
        return Err(IngestError::MissingRequiredFields);
    }
    Ok(metadata)
}

fn default_single_metadata(file_name: &str) -> UploadMetadata {
    let mut metadata = UploadMetadata::new(format!("Single file upload: {file_name}"), "general");
    metadata.uploaded_by = Some("anonymous".into());
    metadata
}

async fn drain(mut field: multer::Field<'static>) -> Result<(), IngestError> {
    while field.chunk().await?.is_some() {}
    Ok(())
}

use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use tokio::io::AsyncRead;
use tracing::debug;

use filestream_protocol::constants::TEXT_PLAIN_UTF8;

use crate::TransferError;
use crate::chunked::{ChunkEncoder, ChunkStream};
use crate::content_type::content_type_or_default;
use crate::progress::ProgressCallback;

const CRLF: &[u8] = b"\r\n";

/// Generates a high-entropy boundary token, unique per envelope.
pub fn generate_boundary() -> String {
    format!("----FileStreamBoundary{}", uuid::Uuid::new_v4().simple())
}

/// Where the bytes of a file part come from.
#[derive(Debug, Clone)]
pub enum ByteSource {
    /// A file on disk, opened lazily when its part is reached.
    Path { path: PathBuf, size: u64 },
    /// An in-memory buffer.
    Bytes(Bytes),
}

impl ByteSource {
    pub fn len(&self) -> u64 {
        match self {
            Self::Path { size, .. } => *size,
            Self::Bytes(b) => b.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn open(self) -> Result<(Box<dyn AsyncRead + Unpin + Send>, u64), TransferError> {
        match self {
            Self::Path { path, size } => {
                let file = tokio::fs::File::open(&path).await?;
                Ok((Box::new(file), size))
            }
            Self::Bytes(b) => {
                let len = b.len() as u64;
                Ok((Box::new(Cursor::new(b)), len))
            }
        }
    }
}

/// A plain text form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPart {
    pub name: String,
    pub value: String,
}

impl FieldPart {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A file form field whose bytes are streamed.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub source: ByteSource,
}

impl FilePart {
    /// Builds a part for a file on disk; the content type is guessed from
    /// the extension.
    pub fn from_path(field_name: impl Into<String>, path: &Path, size: u64) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            field_name: field_name.into(),
            content_type: content_type_or_default(&file_name).to_string(),
            file_name,
            source: ByteSource::Path {
                path: path.to_path_buf(),
                size,
            },
        }
    }

    pub fn from_bytes(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let file_name = file_name.into();
        Self {
            field_name: field_name.into(),
            content_type: content_type_or_default(&file_name).to_string(),
            file_name,
            source: ByteSource::Bytes(data.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Part {
    Field(FieldPart),
    File(FilePart),
}

/// An ordered, boundary-delimited `multipart/form-data` body.
///
/// Field parts always precede file parts. File bytes are never buffered:
/// each file is opened only when the stream reaches it and is read through
/// a [`ChunkEncoder`].
#[derive(Debug, Clone)]
pub struct MultipartEnvelope {
    boundary: String,
    parts: Vec<Part>,
}

/// One contiguous piece of the wire body.
enum Segment {
    Static(Bytes),
    File {
        source: ByteSource,
        file_name: String,
        index: usize,
    },
}

impl Segment {
    fn len(&self) -> u64 {
        match self {
            Self::Static(b) => b.len() as u64,
            Self::File { source, .. } => source.len(),
        }
    }
}

impl MultipartEnvelope {
    pub fn build(fields: Vec<FieldPart>, files: Vec<FilePart>, boundary: impl Into<String>) -> Self {
        let parts = fields
            .into_iter()
            .map(Part::Field)
            .chain(files.into_iter().map(Part::File))
            .collect();
        Self {
            boundary: boundary.into(),
            parts,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Value of the request `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact length in bytes of the encoded body.
    pub fn content_length(&self) -> u64 {
        self.segments().iter().map(Segment::len).sum()
    }

    fn file_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, Part::File(_)))
            .count()
    }

    fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::with_capacity(self.parts.len() * 3 + 1);
        let mut file_index = 0;
        let mut pending_crlf = false;

        for part in &self.parts {
            let mut head = Vec::new();
            if pending_crlf {
                head.extend_from_slice(CRLF);
            }
            head.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());

            match part {
                Part::Field(field) => {
                    head.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\
                             Content-Type: {TEXT_PLAIN_UTF8}\r\n\r\n",
                            escape_quoted(&field.name)
                        )
                        .as_bytes(),
                    );
                    head.extend_from_slice(field.value.as_bytes());
                    segments.push(Segment::Static(head.into()));
                }
                Part::File(file) => {
                    file_index += 1;
                    head.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                             Content-Type: {}\r\n\
                             Content-Transfer-Encoding: binary\r\n\r\n",
                            escape_quoted(&file.field_name),
                            escape_quoted(&file.file_name),
                            file.content_type
                        )
                        .as_bytes(),
                    );
                    segments.push(Segment::Static(head.into()));
                    segments.push(Segment::File {
                        source: file.source.clone(),
                        file_name: file.file_name.clone(),
                        index: file_index,
                    });
                }
            }
            pending_crlf = true;
        }

        let mut tail = Vec::new();
        if pending_crlf {
            tail.extend_from_slice(CRLF);
        }
        tail.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        segments.push(Segment::Static(tail.into()));
        segments
    }

    /// Converts the envelope into a lazy chunk stream.
    ///
    /// Headers and delimiters are yielded as their own chunks; file bodies
    /// are yielded in chunks of at most `chunk_size` bytes.
    pub fn into_stream(self, chunk_size: usize, on_progress: Option<ProgressCallback>) -> ChunkStream {
        let file_count = self.file_count();
        let segments = self.segments();
        debug!(
            boundary = %self.boundary,
            parts = self.parts.len(),
            files = file_count,
            "encoding multipart envelope"
        );

        stream::iter(segments)
            .then(move |segment| {
                let on_progress = on_progress.clone();
                async move {
                    let chunks = match segment {
                        Segment::Static(bytes) => {
                            stream::once(async move { Ok::<_, TransferError>(bytes) }).boxed()
                        }
                        Segment::File {
                            source,
                            file_name,
                            index,
                        } => {
                            let (reader, size) = source.open().await?;
                            let mut encoder = ChunkEncoder::new(reader, size, chunk_size)
                                .with_file_name(file_name)
                                .with_position(index, file_count);
                            if let Some(cb) = on_progress {
                                encoder = encoder.on_progress(cb);
                            }
                            encoder.into_stream()
                        }
                    };
                    Ok::<_, TransferError>(chunks)
                }
            })
            .try_flatten()
            .boxed()
    }
}

/// Percent-escapes the characters that would terminate a quoted header value.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use crate::progress::ProgressEvent;

    async fn collect(envelope: MultipartEnvelope, chunk_size: usize) -> Vec<Bytes> {
        envelope
            .into_stream(chunk_size, None)
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn byte_exact_layout() {
        let envelope = MultipartEnvelope::build(
            vec![FieldPart::new("metadata", r#"{"description":"d","category":"c"}"#)],
            vec![
                FilePart::from_bytes("files", "x.txt", &b"hello"[..]),
                FilePart::from_bytes("files", "y.bin", Bytes::new()),
            ],
            "XYZ",
        );
        let expected = concat!(
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"metadata\"\r\n",
            "Content-Type: text/plain; charset=UTF-8\r\n",
            "\r\n",
            "{\"description\":\"d\",\"category\":\"c\"}\r\n",
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"files\"; filename=\"x.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Transfer-Encoding: binary\r\n",
            "\r\n",
            "hello\r\n",
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"files\"; filename=\"y.bin\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "Content-Transfer-Encoding: binary\r\n",
            "\r\n",
            "\r\n",
            "--XYZ--\r\n",
        );

        let length = envelope.content_length();
        let body = collect(envelope, 2).await.concat();
        assert_eq!(String::from_utf8(body).unwrap(), expected);
        assert_eq!(length, expected.len() as u64);
    }

    #[tokio::test]
    async fn file_bytes_are_chunked() {
        let data: Vec<u8> = (0..=255u8).cycle().take(100).collect();
        let envelope = MultipartEnvelope::build(
            vec![],
            vec![FilePart::from_bytes("files", "d.bin", data)],
            "B",
        );
        let chunks = collect(envelope, 16).await;
        // header, 7 file chunks (6 full + 4 bytes), closing delimiter
        assert_eq!(chunks.len(), 9);
        assert!(chunks[1..8].iter().all(|c| c.len() <= 16));
        assert_eq!(chunks[7].len(), 4);
    }

    #[tokio::test]
    async fn parses_back_with_multer() {
        let dir = tempfile::TempDir::new().unwrap();
        let disk_path = dir.path().join("report.csv");
        let disk_data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
        std::fs::File::create(&disk_path)
            .unwrap()
            .write_all(&disk_data)
            .unwrap();

        let boundary = generate_boundary();
        let envelope = MultipartEnvelope::build(
            vec![
                FieldPart::new("metadata", r#"{"description":"d","category":"c"}"#),
                FieldPart::new("note", "second field"),
            ],
            vec![
                FilePart::from_path("files", &disk_path, disk_data.len() as u64),
                FilePart::from_bytes("files", "crlf\r\n--inside.bin", &b"\r\n--not-a-boundary\r\n"[..]),
            ],
            boundary.clone(),
        );

        let mut multipart = multer::Multipart::new(envelope.into_stream(1024, None), boundary);
        let mut seen = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(|m| m.to_string());
            let data = field.bytes().await.unwrap();
            seen.push((name, file_name, content_type, data));
        }

        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].0, "metadata");
        assert_eq!(&seen[0].3[..], br#"{"description":"d","category":"c"}"#);
        assert_eq!(seen[1].0, "note");
        assert_eq!(&seen[1].3[..], b"second field");

        assert_eq!(seen[2].0, "files");
        assert_eq!(seen[2].1.as_deref(), Some("report.csv"));
        assert_eq!(seen[2].2.as_deref(), Some("text/csv"));
        assert_eq!(&seen[2].3[..], &disk_data[..]);

        assert_eq!(seen[3].1.as_deref(), Some("crlf%0D%0A--inside.bin"));
        assert_eq!(&seen[3].3[..], b"\r\n--not-a-boundary\r\n");
    }

    #[tokio::test]
    async fn large_sources_stream_in_bounded_chunks() {
        const FILE_SIZE: u64 = 24 * 1024 * 1024;
        const CHUNK: usize = 8192;

        // Sparse files: the bytes only exist once they are read.
        let dir = tempfile::TempDir::new().unwrap();
        let files: Vec<FilePart> = ["a.bin", "b.bin"]
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                std::fs::File::create(&path).unwrap().set_len(FILE_SIZE).unwrap();
                FilePart::from_path("files", &path, FILE_SIZE)
            })
            .collect();
        let envelope = MultipartEnvelope::build(
            vec![FieldPart::new("metadata", r#"{"description":"d","category":"c"}"#)],
            files,
            generate_boundary(),
        );
        let expected = envelope.content_length();

        let mut stream = envelope.into_stream(CHUNK, None);
        let mut total = 0u64;
        let mut chunks = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= CHUNK, "chunk of {} bytes", chunk.len());
            total += chunk.len() as u64;
            chunks += 1;
        }
        assert_eq!(total, expected);
        assert!(total > 2 * FILE_SIZE);
        assert!(chunks as u64 >= 2 * FILE_SIZE / CHUNK as u64);
    }

    #[tokio::test]
    async fn fields_precede_files() {
        let envelope = MultipartEnvelope::build(
            vec![FieldPart::new("metadata", "{}")],
            vec![FilePart::from_bytes("files", "a.txt", &b"a"[..])],
            "B",
        );
        assert!(matches!(envelope.parts()[0], Part::Field(_)));
        assert!(matches!(envelope.parts()[1], Part::File(_)));
    }

    #[tokio::test]
    async fn missing_file_fails_lazily() {
        let envelope = MultipartEnvelope::build(
            vec![FieldPart::new("metadata", "{}")],
            vec![FilePart::from_path(
                "files",
                Path::new("/nonexistent/filestream/gone.bin"),
                3,
            )],
            "B",
        );
        let mut stream = envelope.into_stream(8, None);
        // The metadata part is produced before the file is touched.
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_ok());
        assert!(matches!(stream.next().await, Some(Err(TransferError::Io(_)))));
    }

    #[tokio::test]
    async fn progress_carries_file_position() {
        let events = Arc::new(Mutex::new(Vec::<ProgressEvent>::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Arc::new(move |e| sink.lock().unwrap().push(e.clone()));

        let envelope = MultipartEnvelope::build(
            vec![],
            vec![
                FilePart::from_bytes("files", "a.bin", vec![0u8; 10]),
                FilePart::from_bytes("files", "b.bin", vec![0u8; 10]),
            ],
            "B",
        );
        let _: Vec<Bytes> = envelope
            .into_stream(10, Some(callback))
            .try_collect()
            .await
            .unwrap();

        let events = events.lock().unwrap();
        let positions: Vec<(String, usize, usize)> = events
            .iter()
            .map(|e| (e.file_name.clone(), e.file_index, e.file_count))
            .collect();
        assert_eq!(
            positions,
            vec![("a.bin".into(), 1, 2), ("b.bin".into(), 2, 2)]
        );
    }

    #[test]
    fn boundaries_are_unique() {
        let a = generate_boundary();
        let b = generate_boundary();
        assert_ne!(a, b);
        assert!(a.starts_with("----FileStreamBoundary"));
        assert!(a.len() <= 70);
    }
}

//! End-to-end uploads against a real ingest server on a loopback port.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use filestream_client::{ClientConfig, OutboundBody, StreamingTransport, UploadError, Uploader};
use filestream_ingest::{IngestServer, ServerConfig};
use filestream_protocol::constants::{FILES_FIELD, METADATA_FIELD};
use filestream_transfer::{
    FieldPart, FilePart, MultipartEnvelope, ProgressCallback, TransferError, generate_boundary,
};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use url::Url;

struct Harness {
    server: Arc<IngestServer>,
    handle: JoinHandle<()>,
    base: Url,
    upload_dir: PathBuf,
    _tmp: TempDir,
}

impl Harness {
    async fn start() -> Self {
        let tmp = TempDir::new().unwrap();
        let upload_dir = tmp.path().join("uploads");
        let server = IngestServer::new(ServerConfig {
            bind: "127.0.0.1".into(),
            port: 0,
            upload_dir: upload_dir.clone(),
            ..ServerConfig::default()
        })
        .unwrap();
        let listener = server.bind().await.unwrap();
        let base = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        let server2 = Arc::clone(&server);
        let handle = tokio::spawn(async move { server2.serve(listener).await.unwrap() });
        Self {
            server,
            handle,
            base,
            upload_dir,
            _tmp: tmp,
        }
    }

    fn url(&self, path: &str) -> Url {
        self.base.join(path).unwrap()
    }

    fn stored(&self) -> Vec<String> {
        match std::fs::read_dir(&self.upload_dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn stop(self) {
        self.server.shutdown();
        self.handle.await.unwrap();
    }
}

fn client(chunk_size: usize) -> Uploader {
    Uploader::new(ClientConfig {
        chunk_size,
        ..ClientConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn raw_upload_roundtrip() {
    let harness = Harness::start().await;
    let src = TempDir::new().unwrap();
    let path = src.path().join("a.txt");
    std::fs::write(&path, b"seventeen bytes!!").unwrap();

    let outcome = client(4)
        .upload_raw(&path, &harness.url("/api/v1/files/upload"))
        .await
        .unwrap();
    assert_eq!(outcome.http_status, 200);
    assert_eq!(outcome.total_bytes, 17);
    assert_eq!(outcome.message, "File uploaded successfully: a.txt");

    let listed = client(4)
        .list_files(&harness.url("/api/v1/files/files"))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].ends_with("_a.txt"));
    assert_eq!(Some(listed[0].clone()), outcome.saved_filename);

    let stored = std::fs::read(harness.upload_dir.join(&listed[0])).unwrap();
    assert_eq!(stored, b"seventeen bytes!!");
    harness.stop().await;
}

#[tokio::test]
async fn multipart_skips_empty_file() {
    let harness = Harness::start().await;
    let src = TempDir::new().unwrap();
    let x = src.path().join("x.txt");
    let y = src.path().join("y.bin");
    std::fs::write(&x, b"hello").unwrap();
    std::fs::write(&y, b"").unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: ProgressCallback = Arc::new(move |e| sink.lock().unwrap().push(e.clone()));

    let metadata = serde_json::json!({"description": "d", "category": "c"});
    let outcome = client(2)
        .with_progress(callback)
        .upload_multipart(&[x, y], &harness.url("/api/v1/multipart/upload"), Some(metadata))
        .await
        .unwrap();
    assert_eq!(outcome.file_count, Some(1));
    assert_eq!(outcome.message, "Successfully uploaded 1 files");
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.total_bytes, 5);
    assert_eq!(outcome.files[0].original_filename, "x.txt");
    assert_eq!(harness.stored().len(), 1);

    let events = events.lock().unwrap();
    assert_eq!(events.last().map(|e| e.percent), Some(100));
    assert!(events.iter().all(|e| e.file_name == "x.txt"));
    harness.stop().await;
}

#[tokio::test]
async fn malformed_metadata_persists_nothing() {
    let harness = Harness::start().await;
    let envelope = MultipartEnvelope::build(
        vec![FieldPart::new(METADATA_FIELD, r#"{"description":"#)],
        vec![FilePart::from_bytes(FILES_FIELD, "x.txt", &b"hello"[..])],
        generate_boundary(),
    );

    let transport = StreamingTransport::new(&ClientConfig::default()).unwrap();
    let decoded = transport
        .send(
            harness.url("/api/v1/multipart/upload"),
            OutboundBody::multipart(envelope, 8192, None),
        )
        .await
        .unwrap();
    assert_eq!(decoded.status, 400);
    let err = decoded.into_outcome().unwrap_err();
    match err {
        UploadError::Server { status, error, .. } => {
            assert_eq!(status, 400);
            assert_eq!(error.as_deref(), Some("Invalid JSON"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(harness.stored().is_empty());
    harness.stop().await;
}

#[tokio::test]
async fn raw_missing_filename_is_server_error() {
    let harness = Harness::start().await;
    let transport = StreamingTransport::new(&ClientConfig::default()).unwrap();
    let body = OutboundBody::raw(
        Box::pin(futures_util::stream::iter(vec![Ok::<_, TransferError>(bytes::Bytes::from_static(b"data"))])),
        4,
    );
    let decoded = transport
        .send(harness.url("/api/v1/files/upload"), body)
        .await
        .unwrap();
    assert_eq!(decoded.status, 400);
    assert_eq!(
        decoded.summary.error.as_deref(),
        Some("Filename parameter is missing.")
    );
    harness.stop().await;
}

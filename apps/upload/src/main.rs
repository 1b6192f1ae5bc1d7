use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use url::Url;

use filestream_client::{ClientConfig, TransferOutcome, UploadError, Uploader};
use filestream_protocol::constants::{MULTIPART_API_BASE, RAW_API_BASE};
use filestream_transfer::{ProgressCallback, ProgressEvent};

/// Streams files to a filestream server.
#[derive(Debug, Parser)]
#[command(name = "filestream-upload", version)]
struct Cli {
    /// Server base URL.
    #[arg(short, long, env = "FILESTREAM_SERVER", default_value = "http://localhost:8080")]
    server: Url,

    /// TOML client configuration.
    #[arg(short, long, env = "FILESTREAM_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Chunk size in bytes.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Connection timeout in milliseconds.
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload one file as a raw octet stream.
    Raw { file: PathBuf },

    /// Upload files in one multipart request.
    Multipart {
        /// Metadata JSON document.
        #[arg(long)]
        metadata: Option<String>,

        /// File holding the metadata JSON; takes precedence over --metadata.
        #[arg(long)]
        metadata_file: Option<PathBuf>,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List the files stored on the server.
    List {
        #[arg(long, value_enum, default_value_t = Api::Multipart)]
        api: Api,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Api {
    Raw,
    Multipart,
}

impl Cli {
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ClientConfig::default(),
        };
        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout_ms = ms;
        }
        Ok(config)
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        self.server
            .join(path)
            .with_context(|| format!("invalid endpoint {path}"))
    }
}

fn log_progress(event: &ProgressEvent) {
    tracing::info!(
        file = %event.file_name,
        index = event.file_index,
        of = event.file_count,
        percent = event.percent,
        sent = event.bytes_sent,
        total = event.total_bytes,
        kib_per_sec = (event.bytes_per_second / 1024.0).round(),
        eta_secs = event.eta.map(|d| d.as_secs()),
        "upload progress"
    );
}

fn read_metadata(inline: Option<String>, file: Option<PathBuf>) -> anyhow::Result<Option<serde_json::Value>> {
    let text = match (file, inline) {
        (Some(path), _) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading metadata file {}", path.display()))?,
        (None, Some(text)) => text,
        (None, None) => return Ok(None),
    };
    let value = serde_json::from_str(&text).context("metadata is not valid JSON")?;
    Ok(Some(value))
}

fn report(outcome: &TransferOutcome) {
    println!("{} (HTTP {})", outcome.message, outcome.http_status);
    for file in &outcome.files {
        println!(
            "  {} -> {} ({} bytes)",
            file.original_filename, file.saved_filename, file.size
        );
    }
    println!("total: {} bytes", outcome.total_bytes);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,filestream=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.client_config()?;
    let progress: ProgressCallback = Arc::new(log_progress);
    let uploader = Uploader::new(config)?.with_progress(progress);

    let result = match cli.command {
        Command::Raw { ref file } => {
            let endpoint = cli.endpoint(&format!("{RAW_API_BASE}/upload"))?;
            uploader.upload_raw(file, &endpoint).await.map(|o| report(&o))
        }
        Command::Multipart {
            ref metadata,
            ref metadata_file,
            ref files,
        } => {
            let metadata = read_metadata(metadata.clone(), metadata_file.clone())?;
            let endpoint = cli.endpoint(&format!("{MULTIPART_API_BASE}/upload"))?;
            uploader
                .upload_multipart(files, &endpoint, metadata)
                .await
                .map(|o| report(&o))
        }
        Command::List { api } => {
            let base = match api {
                Api::Raw => RAW_API_BASE,
                Api::Multipart => MULTIPART_API_BASE,
            };
            let endpoint = cli.endpoint(&format!("{base}/files"))?;
            uploader.list_files(&endpoint).await.map(|names| {
                for name in names {
                    println!("{name}");
                }
            })
        }
    };

    if let Err(e) = &result {
        tracing::error!(kind = ?e.kind(), sent = ?e.bytes_sent(), "{e}");
        if let UploadError::Server { body, .. } = e {
            eprintln!("{body}");
        }
    }
    Ok(result?)
}

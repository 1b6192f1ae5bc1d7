use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use filestream_ingest::{IngestServer, ServerConfig};

/// Streaming upload server for the raw and multipart APIs.
#[derive(Debug, Parser)]
#[command(name = "filestream-server", version)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, env = "FILESTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to bind.
    #[arg(long, env = "FILESTREAM_BIND")]
    bind: Option<String>,

    /// TCP port (0 picks a free one).
    #[arg(short, long, env = "FILESTREAM_PORT")]
    port: Option<u16>,

    /// Destination directory for stored files.
    #[arg(long, env = "FILESTREAM_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Write buffer size in bytes.
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Per-file ceiling for multipart parts, in bytes.
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Ceiling for a whole multipart request, in bytes.
    #[arg(long)]
    max_request_size: Option<u64>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = self.upload_dir {
            config.upload_dir = dir;
        }
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if let Some(size) = self.max_file_size {
            config.max_file_size = size;
        }
        if let Some(size) = self.max_request_size {
            config.max_request_size = size;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,filestream=debug,tower_http=info")),
        )
        .init();

    let config = Args::parse().into_config()?;
    tracing::info!(
        bind = %config.bind,
        port = config.port,
        max_file_size = config.max_file_size,
        max_request_size = config.max_request_size,
        "starting filestream server"
    );

    let server = IngestServer::new(config)?;
    let signal_server = std::sync::Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            signal_server.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}

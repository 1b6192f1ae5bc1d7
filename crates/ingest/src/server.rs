//! Ingest HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::ServerError;
use crate::config::ServerConfig;
use crate::pipeline::IngestPipeline;
use crate::routes;

/// Serves the upload APIs until [`shutdown`](Self::shutdown) is called.
pub struct IngestServer {
    config: ServerConfig,
    pipeline: Arc<IngestPipeline>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl IngestServer {
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, ServerError> {
        let pipeline = Arc::new(IngestPipeline::new(&config)?);
        Ok(Arc::new(Self {
            config,
            pipeline,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        }))
    }

    pub fn pipeline(&self) -> &Arc<IngestPipeline> {
        &self.pipeline
    }

    /// Returns the local address once the server is listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Gracefully shuts down the server. In-flight requests complete first.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Binds the configured address and serves until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.socket_addr()?;
        Ok(TcpListener::bind(addr).await?)
    }

    /// Serves on an already bound listener.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);

        self.pipeline
            .upload_dir()
            .ensure()
            .await
            .map_err(ServerError::UploadDir)?;
        tracing::info!(
            upload_dir = %self.config.upload_dir.display(),
            "ingest server listening on {local_addr}"
        );

        let cancel = self.cancel.clone();
        axum::serve(listener, routes::router(Arc::clone(&self.pipeline)))
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("server shutting down");
            })
            .await?;
        Ok(())
    }
}

//! HTTP surface of the ingest server.
//!
//! | Method | Path                                 | Handler            |
//! |--------|--------------------------------------|--------------------|
//! | POST   | `/api/v1/files/upload?filename=`     | raw octet stream   |
//! | GET    | `/api/v1/files/files`                | listing            |
//! | POST   | `/api/v1/multipart/upload`           | metadata + files   |
//! | POST   | `/api/v1/multipart/upload/single`    | one file           |
//! | GET    | `/api/v1/multipart/files`            | listing            |

use std::any::Any;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use filestream_protocol::constants::{MULTIPART_API_BASE, RAW_API_BASE};
use filestream_protocol::{ErrorResponse, RawUploadResponse, UploadResponse};

use crate::error::{IngestError, RawApiError};
use crate::pipeline::IngestPipeline;

type AppState = Arc<IngestPipeline>;

/// Builds the router serving both upload APIs.
pub fn router(pipeline: Arc<IngestPipeline>) -> Router {
    Router::new()
        .route(&format!("{RAW_API_BASE}/upload"), post(upload_raw))
        .route(&format!("{RAW_API_BASE}/files"), get(list_raw))
        .route(&format!("{MULTIPART_API_BASE}/upload"), post(upload_multipart))
        .route(&format!("{MULTIPART_API_BASE}/upload/single"), post(upload_single))
        .route(&format!("{MULTIPART_API_BASE}/files"), get(list_multipart))
        // Limits are enforced while streaming, not by buffering extractors.
        .layer(DefaultBodyLimit::disable())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

#[derive(Debug, Deserialize)]
struct RawUploadQuery {
    filename: Option<String>,
}

async fn upload_raw(
    State(pipeline): State<AppState>,
    Query(query): Query<RawUploadQuery>,
    body: Body,
) -> Result<Json<RawUploadResponse>, RawApiError> {
    let stored = pipeline
        .ingest_raw(query.filename.as_deref(), body.into_data_stream())
        .await?;
    Ok(Json(RawUploadResponse {
        message: format!("File uploaded successfully: {}", stored.original_filename),
        size: stored.byte_count,
        saved_filename: Some(stored.stored_filename),
    }))
}

async fn list_raw(State(pipeline): State<AppState>) -> Result<Json<Vec<String>>, RawApiError> {
    Ok(Json(pipeline.list().await?))
}

async fn upload_multipart(
    State(pipeline): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, IngestError> {
    let boundary = boundary(&headers)?;
    let response = pipeline
        .ingest_multipart(body.into_data_stream(), &boundary)
        .await?;
    Ok(Json(response))
}

async fn upload_single(
    State(pipeline): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, IngestError> {
    let boundary = boundary(&headers)?;
    let response = pipeline.ingest_single(body.into_data_stream(), &boundary).await?;
    Ok(Json(response))
}

async fn list_multipart(State(pipeline): State<AppState>) -> Result<Json<Vec<String>>, IngestError> {
    Ok(Json(pipeline.list().await?))
}

fn boundary(headers: &HeaderMap) -> Result<String, IngestError> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or(IngestError::MissingBoundary)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "handler panicked");
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    let body = ErrorResponse::new("Upload Error", "Unexpected error occurred.", status.as_u16());
    (status, Json(body)).into_response()
}

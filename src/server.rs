//! HTTP surface for the ingestion pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Accept a multipart upload, return a job id |
//! | `GET`  | `/upload/status` | Poll job progress by `job_id` |
//! | `GET`  | `/files` | List file summaries for a user/project |
//! | `GET`  | `/files/chunks` | Fetch stored chunks for one file |
//! | `DELETE` | `/files` | Remove all stored data for one file |
//! | `GET`  | `/health` | DB ping + index check |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "user_id is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the frontend is served
//! from a different origin.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::IngestError;
use crate::models::{FileSummary, UploadFile};
use crate::pipeline::{Ingestor, UploadRequest};
use crate::storage::ChunkRecord;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    ingestor: Arc<Ingestor>,
    max_body_bytes: usize,
}

/// Start the HTTP server on `bind_addr`. Runs until the process exits.
pub async fn run_server(ingestor: Arc<Ingestor>, bind_addr: &str) -> anyhow::Result<()> {
    // Room for a full batch of maximum-size files plus form fields.
    let max_body_bytes = ingestor.max_upload_body_bytes();
    let state = AppState {
        ingestor,
        max_body_bytes,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/upload", post(handle_upload))
        .route("/upload/status", get(handle_status))
        .route("/files", get(handle_list_files).delete(handle_delete_file))
        .route("/files/chunks", get(handle_file_chunks))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind = bind_addr, "ingestion server listening");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Validation and unsupported-type failures are the client's fault;
/// everything else is ours.
fn from_anyhow(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<IngestError>() {
        Some(IngestError::Validation(_)) | Some(IngestError::UnsupportedType(_)) => {
            bad_request(err.to_string())
        }
        _ => internal_error(err.to_string()),
    }
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadAccepted {
    job_id: String,
    status: &'static str,
    total_files: usize,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadAccepted>, AppError> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => {
                request.user_id = field
                    .text()
                    .await
                    .map_err(|e| bad_request(e.to_string()))?;
            }
            "project_id" => {
                request.project_id = field
                    .text()
                    .await
                    .map_err(|e| bad_request(e.to_string()))?;
            }
            "replace_filenames" => {
                let raw = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                let names: Vec<String> = serde_json::from_str(&raw)
                    .map_err(|_| bad_request("replace_filenames must be a JSON string array"))?;
                request.replace_filenames = names.into_iter().collect();
            }
            "rename_map" => {
                let raw = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                request.rename_map = serde_json::from_str::<HashMap<String, String>>(&raw)
                    .map_err(|_| bad_request("rename_map must be a JSON string object"))?;
            }
            "files" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| bad_request("file field is missing a filename"))?;
                let bytes = field.bytes().await.map_err(|e| bad_request(e.to_string()))?;
                request.files.push(UploadFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let total_files = request.files.len();
    let job_id = state
        .ingestor
        .clone()
        .submit_upload(request)
        .await
        .map_err(from_anyhow)?;

    Ok(Json(UploadAccepted {
        job_id,
        status: "processing",
        total_files,
    }))
}

// ============ GET /upload/status ============

#[derive(Deserialize)]
struct StatusQuery {
    job_id: String,
}

#[derive(Serialize)]
struct StatusResponse {
    job_id: String,
    status: crate::models::JobStatus,
    total: usize,
    completed: usize,
    last_error: Option<String>,
}

async fn handle_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, AppError> {
    let job = state
        .ingestor
        .jobs()
        .get(&query.job_id)
        .await
        .map_err(from_anyhow)?
        .ok_or_else(|| not_found(format!("unknown job: {}", query.job_id)))?;

    Ok(Json(StatusResponse {
        job_id: job.job_id,
        status: job.status,
        total: job.total,
        completed: job.completed,
        last_error: job.last_error,
    }))
}

// ============ GET /files ============

#[derive(Deserialize)]
struct FilesQuery {
    user_id: String,
    project_id: String,
}

#[derive(Serialize)]
struct FilesResponse {
    files: Vec<FileSummary>,
    filenames: Vec<String>,
}

async fn handle_list_files(
    State(state): State<AppState>,
    Query(query): Query<FilesQuery>,
) -> Result<Json<FilesResponse>, AppError> {
    let files = state
        .ingestor
        .store()
        .list_files(&query.user_id, &query.project_id)
        .await
        .map_err(from_anyhow)?;
    let filenames = files.iter().map(|f| f.filename.clone()).collect();
    Ok(Json(FilesResponse { files, filenames }))
}

// ============ GET /files/chunks ============

#[derive(Deserialize)]
struct ChunksQuery {
    user_id: String,
    project_id: String,
    filename: String,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct ChunksResponse {
    chunks: Vec<ChunkRecord>,
}

async fn handle_file_chunks(
    State(state): State<AppState>,
    Query(query): Query<ChunksQuery>,
) -> Result<Json<ChunksResponse>, AppError> {
    // limit 0 means unlimited in the driver, which is the default here.
    let chunks = state
        .ingestor
        .store()
        .get_file_chunks(
            &query.user_id,
            &query.project_id,
            &query.filename,
            query.limit.unwrap_or(0).max(0),
        )
        .await
        .map_err(from_anyhow)?;
    Ok(Json(ChunksResponse { chunks }))
}

// ============ DELETE /files ============

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
    chunks_deleted: u64,
}

async fn handle_delete_file(
    State(state): State<AppState>,
    Query(query): Query<ChunksQuery>,
) -> Result<Json<DeleteResponse>, AppError> {
    let chunks_deleted = state
        .ingestor
        .store()
        .delete_file_data(&query.user_id, &query.project_id, &query.filename)
        .await
        .map_err(from_anyhow)?;
    Ok(Json(DeleteResponse {
        deleted: true,
        chunks_deleted,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    mongodb_connected: bool,
    service: &'static str,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.ingestor.store();
    let connected = match store.ping().await {
        Ok(()) => store.ensure_indexes().await.is_ok(),
        Err(_) => false,
    };
    Json(HealthResponse {
        ok: true,
        mongodb_connected: connected,
        service: "ingestion_pipeline",
    })
}

//! HTTP surface of the burn protocol.
//!
//! JSON in and out except the encrypted payloads, which travel as raw
//! bodies. Every response carries `Cache-Control: no-store`; Gone answers
//! never distinguish "never existed" from "already consumed".

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use cinder_core::config::CinderConfig;
use cinder_core::types::*;
use cinder_core::CinderError;
use cinder_crypto::TAG_SIZE;
use cinder_store::{BurnStore, RateLimiter};

use crate::guard::{self, Scope};
use crate::metrics::ApiMetrics;

#[derive(Clone)]
pub struct AppState {
    pub store: BurnStore,
    pub limiter: RateLimiter,
    pub config: Arc<CinderConfig>,
    pub metrics: Arc<ApiMetrics>,
}

pub enum ApiError {
    Core(CinderError),
    CrossOrigin,
    /// Chunk upload against an expired or vanished file (410, not 404)
    UploadExpired,
}

impl From<CinderError> for ApiError {
    fn from(e: CinderError) -> Self {
        ApiError::Core(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::CrossOrigin => error_response(
                StatusCode::FORBIDDEN,
                "cross-origin request refused",
            ),
            ApiError::UploadExpired => error_response(StatusCode::GONE, "upload expired"),
            ApiError::Core(e) => match e {
                CinderError::Validation(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
                CinderError::Gone => error_response(StatusCode::NOT_FOUND, "not found"),
                CinderError::Unauthorized => {
                    error_response(StatusCode::UNAUTHORIZED, "invalid or expired token")
                }
                CinderError::RateLimited { retry_after_secs } => {
                    let mut response = error_response(
                        StatusCode::TOO_MANY_REQUESTS,
                        "rate limit exceeded",
                    );
                    if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                        response.headers_mut().insert(header::RETRY_AFTER, value);
                    }
                    response
                }
                other => {
                    tracing::error!(error = %other, "internal error");
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
                }
            },
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

pub fn router(state: AppState) -> Router {
    let whole_file_limit =
        state.config.limits.whole_file_max_bytes() as usize + TAG_SIZE + 1024;
    let chunk_limit = state.config.limits.chunk_max_bytes as usize + TAG_SIZE + 1024;

    Router::new()
        .route("/api/notes", post(create_note))
        .route("/api/notes/{id}/meta", get(note_meta))
        .route("/api/notes/{id}/validate-passphrase", post(validate_note))
        .route("/api/notes/{id}/fetch", post(fetch_note))
        .route(
            "/api/files/upload",
            post(upload_whole_file).layer(DefaultBodyLimit::max(whole_file_limit)),
        )
        .route("/api/files/init-chunked", post(init_chunked))
        .route(
            "/api/files/chunk",
            get(download_chunk)
                .post(upload_chunk)
                .layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/api/files/{id}/meta", get(file_meta))
        .route("/api/files/{id}/validate-passphrase", post(validate_file))
        .route("/api/files/{id}/download", post(download_whole))
        .route("/api/files/{id}/finalize", post(finalize_chunked))
        .layer(axum::middleware::map_response(set_no_store))
        .with_state(state)
}

/// Ciphertext must never land in a shared cache.
async fn set_no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn known_id(id: &str) -> Result<(), ApiError> {
    if guard::valid_id(id) {
        Ok(())
    } else {
        Err(CinderError::Gone.into())
    }
}

fn well_formed_id(id: &str) -> Result<(), ApiError> {
    if guard::valid_id(id) {
        Ok(())
    } else {
        Err(CinderError::Validation("malformed id".into()).into())
    }
}

// ── Notes ────────────────────────────────────────────────────────────────────

async fn create_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateNoteRequest>,
) -> Result<Json<CreateNoteResponse>, ApiError> {
    guard::require_same_origin(&state, &headers)?;
    guard::admit(&state, &headers, Scope::NotesCreate).await?;

    let id = state.store.create_note(&req).await?;
    state.metrics.notes_created.inc();
    tracing::debug!(id, "note created");
    Ok(Json(CreateNoteResponse { id }))
}

async fn note_meta(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<NoteMetaResponse>, ApiError> {
    guard::admit(&state, &headers, Scope::NotesMeta).await?;
    known_id(&id)?;

    Ok(Json(state.store.get_note_meta(&id).await?))
}

async fn validate_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ValidatePassphraseRequest>,
) -> Result<Json<ValidatePassphraseResponse>, ApiError> {
    guard::require_same_origin(&state, &headers)?;
    guard::admit(&state, &headers, Scope::NotesValidate).await?;
    well_formed_id(&id)?;

    let valid = state.store.validate_note_passphrase(&id, &req.hash).await?;
    Ok(Json(ValidatePassphraseResponse { valid }))
}

async fn fetch_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FetchNoteResponse>, ApiError> {
    guard::require_same_origin(&state, &headers)?;
    guard::admit(&state, &headers, Scope::NotesFetch).await?;
    known_id(&id)?;

    let note = state.store.burn_and_fetch_note(&id).await?;
    state.metrics.notes_burned.inc();
    tracing::debug!(id, "note burned");
    Ok(Json(note))
}

// ── Files ────────────────────────────────────────────────────────────────────

async fn upload_whole_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<WholeFileParams>,
    body: Bytes,
) -> Result<Json<CreateFileResponse>, ApiError> {
    guard::require_same_origin(&state, &headers)?;
    guard::admit(&state, &headers, Scope::FilesUpload).await?;

    let created = state.store.create_file_whole(&params, body.to_vec()).await?;
    state.metrics.files_created.inc();
    tracing::debug!(id = created.id, "whole file stored");
    Ok(Json(created))
}

async fn init_chunked(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InitChunkedRequest>,
) -> Result<Json<InitChunkedResponse>, ApiError> {
    guard::require_same_origin(&state, &headers)?;
    guard::admit(&state, &headers, Scope::FilesInitChunked).await?;

    let id = state.store.init_chunked_upload(&req).await?;
    state.metrics.files_created.inc();
    tracing::debug!(id, total_chunks = req.total_chunks, "chunked upload started");
    Ok(Json(InitChunkedResponse { id }))
}

async fn upload_chunk(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ChunkUploadParams>,
    body: Bytes,
) -> Result<Json<ChunkUploadResponse>, ApiError> {
    guard::require_same_origin(&state, &headers)?;
    guard::admit(&state, &headers, Scope::FilesChunkUpload).await?;
    well_formed_id(&params.file_id)?;

    state
        .store
        .upload_chunk(
            &params.file_id,
            params.index,
            params.total,
            params.iv_base.as_deref(),
            body.to_vec(),
        )
        .await
        .map_err(|e| match e {
            // An expired upload target is 410, unlike the reveal paths
            CinderError::Gone => ApiError::UploadExpired,
            other => other.into(),
        })?;

    Ok(Json(ChunkUploadResponse { ok: true }))
}

async fn file_meta(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileMetaResponse>, ApiError> {
    known_id(&id)?;
    Ok(Json(state.store.get_file_meta(&id).await?))
}

async fn validate_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ValidatePassphraseRequest>,
) -> Result<Json<ValidatePassphraseResponse>, ApiError> {
    guard::require_same_origin(&state, &headers)?;
    guard::admit(&state, &headers, Scope::FilesValidate).await?;
    well_formed_id(&id)?;

    let valid = state.store.validate_file_passphrase(&id, &req.hash).await?;
    Ok(Json(ValidatePassphraseResponse { valid }))
}

async fn download_whole(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<DownloadRequest>,
) -> Result<Response, ApiError> {
    guard::require_same_origin(&state, &headers)?;
    guard::admit(&state, &headers, Scope::FilesDownload).await?;
    known_id(&id)?;

    let (file_name, bytes) = state.store.download_whole(&id, &req.download_token).await?;
    state.metrics.files_downloaded.inc();
    tracing::debug!(id, "whole file downloaded and burned");

    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        rfc5987_encode(&file_name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn download_chunk(
    State(state): State<AppState>,
    Query(params): Query<ChunkDownloadParams>,
) -> Result<Response, ApiError> {
    known_id(&params.file_id)?;

    let bytes = state
        .store
        .download_chunk(&params.file_id, params.index, &params.download_token)
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

async fn finalize_chunked(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<FinalizeResponse>, ApiError> {
    guard::require_same_origin(&state, &headers)?;
    known_id(&id)?;

    let result = state.store.finalize_chunked(&id, &req.download_token).await?;
    if result.chunks_deleted > 0 {
        state.metrics.files_downloaded.inc();
        tracing::debug!(id, chunks = result.chunks_deleted, "chunked file finalized");
    }
    Ok(Json(result))
}

/// RFC 5987 `filename*` value: attr-chars stay, everything else (UTF-8
/// bytes included) is percent-encoded.
fn rfc5987_encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

//! HTTP request handlers

use crate::api::server::AppContext;
use crate::db::grids;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use base64::Engine as _;
use mosaic_common::events::MosaicEvent;
use mosaic_common::model::{GridState, MediaRef};
use mosaic_common::{Error, SLOT_COUNT, TAKE_COUNT};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::error;
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub uri: String,
    /// Base64-encoded content
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub takes: Vec<MediaRef>,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub generation: Option<Uuid>,
    pub slots: Vec<MediaRef>,
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClipResponse {
    pub url: String,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_response(error: Error) -> ApiError {
    let status = match &error {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", error);
    }
    (status, Json(json!({ "error": error.to_string() })))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "mosaic-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /grid - current grid snapshot (never fails; defaults when absent)
pub async fn get_current_grid(State(ctx): State<AppContext>) -> Json<GridState> {
    Json(grids::load_current(&ctx.db_pool).await)
}

/// GET /grid/:generation - snapshot of one generation
pub async fn get_grid(
    State(ctx): State<AppContext>,
    Path(generation): Path<Uuid>,
) -> Json<GridState> {
    Json(grids::load_grid(&ctx.db_pool, generation).await)
}

/// PUT /grid - whole-state replace (last-writer-wins)
pub async fn replace_grid(
    State(ctx): State<AppContext>,
    Json(state): Json<GridState>,
) -> Result<StatusCode, ApiError> {
    if state.slots.len() != SLOT_COUNT {
        return Err(error_response(Error::Validation(format!(
            "grid must have exactly {SLOT_COUNT} slots, got {}",
            state.slots.len()
        ))));
    }
    grids::save_grid(&ctx.db_pool, &state)
        .await
        .map_err(error_response)?;

    let version = ctx.grid_version.fetch_add(1, Ordering::AcqRel) + 1;
    ctx.bus.emit_lossy(MosaicEvent::GridChanged {
        generation: state.generation,
        version,
        timestamp: chrono::Utc::now(),
    });
    Ok(StatusCode::NO_CONTENT)
}

/// POST /media - store a raw blob, returning its durable key
pub async fn upload_media(
    State(ctx): State<AppContext>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&request.content)
        .map_err(|e| error_response(Error::Validation(format!("content is not base64: {e}"))))?;
    let media = ctx
        .media
        .store(&bytes)
        .map_err(error_response)?;
    tracing::debug!("Stored {} ({} bytes) from {}", media, bytes.len(), request.uri);
    Ok(Json(UploadResponse {
        key: media.as_str().to_string(),
    }))
}

/// GET /media/:key/url - playable URL for a stored key
pub async fn resolve_media(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let media = MediaRef::new(key);
    match ctx.media.resolve(&media) {
        Some(url) => Ok(Json(ResolveResponse { url })),
        None => Err(error_response(Error::NotFound(format!("media {media}")))),
    }
}

/// GET /media/:key/raw - blob content
pub async fn fetch_media(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<Vec<u8>, ApiError> {
    ctx.media.read(&MediaRef::new(key)).map_err(error_response)
}

/// POST /compose/merge - merge exactly 3 takes into one clip
pub async fn merge_takes(
    State(ctx): State<AppContext>,
    Json(request): Json<MergeRequest>,
) -> Result<Json<ClipResponse>, ApiError> {
    if request.takes.len() != TAKE_COUNT {
        return Err(error_response(Error::Validation(format!(
            "merge requires exactly {TAKE_COUNT} media parts, got {}",
            request.takes.len()
        ))));
    }
    let mut paths: Vec<PathBuf> = Vec::with_capacity(TAKE_COUNT);
    for media in &request.takes {
        let path = ctx.media.path_for(media).ok_or_else(|| {
            error_response(Error::Validation(format!("unknown media reference {media}")))
        })?;
        paths.push(path);
    }

    let merged = ctx
        .pipeline
        .merge_takes(&paths)
        .await
        .map_err(error_response)?;
    let stored = ctx
        .media
        .store_file(&merged)
        .map_err(error_response)?;
    Ok(Json(ClipResponse {
        url: ctx.media.url_for(&stored),
    }))
}

/// POST /compose/finalize - full pipeline over 16 canonical references
pub async fn finalize(
    State(ctx): State<AppContext>,
    Json(request): Json<FinalizeRequest>,
) -> Result<Json<ClipResponse>, ApiError> {
    if request.slots.len() != SLOT_COUNT {
        return Err(error_response(Error::Validation(format!(
            "finalize requires exactly {SLOT_COUNT} media references, got {}",
            request.slots.len()
        ))));
    }
    let generation = request.generation.unwrap_or_else(Uuid::new_v4);
    let url = ctx
        .pipeline
        .finalize(generation, &request.slots, &request.recipients)
        .await
        .map_err(error_response)?;
    Ok(Json(ClipResponse { url }))
}

// handlers/protected/media.rs - media library
//
// GET    /api/media        read:media
// GET    /api/media/:id    read:media
// POST   /api/media        write:media
// PUT    /api/media/:id    write:media
// DELETE /api/media/:id    delete:media

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::content::{MediaInput, MediaRecord};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

pub async fn media_list(State(state): State<AppState>) -> ApiResult<Vec<MediaRecord>> {
    Ok(ApiResponse::success(state.media.list().await?))
}

pub async fn media_get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<MediaRecord> {
    Ok(ApiResponse::success(state.media.get(&id).await?))
}

pub async fn media_create(State(state): State<AppState>, Json(input): Json<MediaInput>) -> ApiResult<MediaRecord> {
    Ok(ApiResponse::created(state.media.create(input).await?))
}

pub async fn media_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<MediaInput>,
) -> ApiResult<MediaRecord> {
    Ok(ApiResponse::success(state.media.update(&id, input).await?))
}

pub async fn media_delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    state.media.delete(&id).await?;
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

// handlers/admin/keys.rs - API key lifecycle
//
// POST   /admin/keys          generate (full key returned once)
// GET    /admin/keys          list (masked)
// DELETE /admin/keys/:id      revoke, ?hard=true deletes the record

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::keys::{GenerateKeyRequest, KeyRecord};
use crate::middleware::{AdminIdentity, ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RevokeQuery {
    #[serde(default)]
    pub hard: bool,
}

pub async fn key_create(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    Json(request): Json<GenerateKeyRequest>,
) -> ApiResult<KeyRecord> {
    let record = state.keys.generate_key(request).await?;
    tracing::info!(admin = %admin.email, key_id = %record.id, "API key generated");
    Ok(ApiResponse::created(record))
}

pub async fn key_list(State(state): State<AppState>) -> ApiResult<Vec<KeyRecord>> {
    let keys = state.keys.list_keys().await?;
    Ok(ApiResponse::success(keys.iter().map(KeyRecord::masked).collect()))
}

pub async fn key_revoke(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    Path(id): Path<String>,
    Query(query): Query<RevokeQuery>,
) -> ApiResult<Value> {
    let remaining = state.keys.revoke_key(&id, query.hard).await?;
    tracing::info!(admin = %admin.email, key_id = %id, hard = query.hard, "API key revoked");

    Ok(ApiResponse::success(json!({
        "id": id,
        "deleted": query.hard,
        "key": remaining.as_ref().map(KeyRecord::masked),
    })))
}

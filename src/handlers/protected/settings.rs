// handlers/protected/settings.rs - GET /api/settings (read:settings), PUT /api/settings (write:settings)

use axum::{extract::State, Json};
use serde_json::Value;

use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

pub async fn settings_get(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(ApiResponse::success(state.settings.get().await?))
}

/// Merge-updates the stored settings
pub async fn settings_update(State(state): State<AppState>, Json(patch): Json<Value>) -> ApiResult<Value> {
    Ok(ApiResponse::success(state.settings.update(patch).await?))
}

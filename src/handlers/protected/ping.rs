// handlers/protected/ping.rs - GET /api/ping (baseline `read` capability)

use axum::Extension;
use serde_json::{json, Value};

use crate::keys::AuthorizedKey;
use crate::middleware::{ApiResponse, ApiResult};

pub async fn ping(Extension(key): Extension<AuthorizedKey>) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "pong": true,
        "key_id": key.id,
        "key_name": key.name,
    })))
}

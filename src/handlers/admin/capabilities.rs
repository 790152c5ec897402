// handlers/admin/capabilities.rs - capability vocabulary and dry-run validation

use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::capability::{self, ValidationReport};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub capabilities: Vec<String>,
}

/// GET /admin/capabilities
pub async fn capabilities_list() -> ApiResult<Value> {
    let presets: serde_json::Map<String, Value> = capability::PRESETS
        .iter()
        .map(|(name, caps)| (name.to_string(), json!(caps)))
        .collect();

    Ok(ApiResponse::success(json!({
        "capabilities": capability::ALL,
        "presets": presets,
        "baseline": capability::READ,
    })))
}

/// POST /admin/capabilities/validate - reports problems without rejecting the request
pub async fn capabilities_validate(Json(request): Json<ValidateRequest>) -> ApiResult<ValidationReport> {
    Ok(ApiResponse::success(capability::validate(&request.capabilities)))
}

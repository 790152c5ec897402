use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::capability;
use crate::error::ApiError;
use crate::keys::AuthorizedKey;
use crate::state::AppState;

/// Route guard state: the capability a route requires
#[derive(Clone)]
pub struct KeyGuard {
    state: AppState,
    required: &'static str,
}

impl KeyGuard {
    pub fn require(state: &AppState, required: &'static str) -> Self {
        Self {
            state: state.clone(),
            required,
        }
    }

    /// Guard for routes that name no specific capability
    pub fn baseline(state: &AppState) -> Self {
        Self::require(state, capability::READ)
    }
}

/// Validates the presented API key against the guarded route's capability.
/// The authorized key is attached to the request and to the response so the
/// telemetry layer can attribute the request.
pub async fn api_key_middleware(
    State(guard): State<KeyGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = guard.state.config.security.api_key_header.as_str();
    let presented = request
        .headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let key = guard.state.validator.authorize(presented.as_deref(), guard.required).await?;
    tracing::debug!(key_id = %key.id, capability = guard.required, "API key authorized");

    request.extensions_mut().insert(key.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert::<AuthorizedKey>(key);
    Ok(response)
}

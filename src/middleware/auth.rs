use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// Administrator context extracted from a verified bearer token
#[derive(Clone, Debug)]
pub struct AdminIdentity {
    pub subject: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl From<Identity> for AdminIdentity {
    fn from(identity: Identity) -> Self {
        Self {
            subject: identity.subject,
            email: identity.email,
            expires_at: identity.expires_at,
        }
    }
}

/// Bearer authentication for `/admin/*`: verifies the token with the identity provider and
/// checks the caller against the configured admin allow-list
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(&headers).map_err(ApiError::unauthorized)?;
    let identity = state.identity.verify(&token).await?;

    if !is_admin(&state.config.security.admin_emails, &identity.email) {
        tracing::warn!(subject = %identity.subject, "Rejected non-admin identity");
        return Err(ApiError::forbidden("Administrator access required"));
    }

    request.extensions_mut().insert(AdminIdentity::from(identity));
    Ok(next.run(request).await)
}

/// Empty allow-list admits any verified identity
fn is_admin(admin_emails: &[String], email: &str) -> bool {
    admin_emails.is_empty() || admin_emails.iter().any(|admin| admin.eq_ignore_ascii_case(email))
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.trim().to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use crate::keys::AuthorizedKey;
use crate::telemetry::{Observation, TelemetryBuffer};

/// Path recorded for requests that matched no route
const UNMATCHED_PATH: &str = "unmatched";

/// Request-completion hook: records exactly one observation per request
pub async fn telemetry_middleware(
    State(buffer): State<Arc<TelemetryBuffer>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string());

    let response = next.run(request).await;

    let key_id = response.extensions().get::<AuthorizedKey>().map(|k| k.id.clone());
    buffer.record(Observation::new(
        method,
        path,
        response.status().as_u16(),
        started.elapsed(),
        key_id,
    ));
    response
}

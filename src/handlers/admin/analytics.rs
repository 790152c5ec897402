// handlers/admin/analytics.rs - request analytics
//
// GET  /admin/analytics/summary?days=N
// GET  /admin/analytics/realtime
// GET  /admin/analytics/keys[?key_id=]
// POST /admin/analytics/flush

use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::telemetry::{KeyUsage, RealTime, Summary};

const DEFAULT_SUMMARY_DAYS: u32 = 7;

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KeyStatsQuery {
    pub key_id: Option<String>,
}

pub async fn analytics_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<Summary> {
    let days = query.days.unwrap_or(DEFAULT_SUMMARY_DAYS);
    Ok(ApiResponse::success(state.aggregator.summary(days).await?))
}

pub async fn analytics_realtime(State(state): State<AppState>) -> ApiResult<RealTime> {
    Ok(ApiResponse::success(state.aggregator.realtime().await?))
}

pub async fn analytics_keys(
    State(state): State<AppState>,
    Query(query): Query<KeyStatsQuery>,
) -> ApiResult<Vec<KeyUsage>> {
    let stats = state.aggregator.per_key_stats(query.key_id.as_deref()).await?;
    Ok(ApiResponse::success(stats))
}

/// On-demand flush; shares the single-flight lock with the scheduler
pub async fn analytics_flush(State(state): State<AppState>) -> ApiResult<Value> {
    let outcome = state.persister.flush().await.map_err(|e| {
        tracing::error!("On-demand analytics flush failed: {}", e);
        ApiError::persistence_error("Analytics flush failed; observations kept for retry")
    })?;

    Ok(ApiResponse::success(json!({
        "flushed": outcome.flushed,
        "buffered": state.telemetry.len(),
    })))
}

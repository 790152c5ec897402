use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::capability;
use crate::error::ApiError;
use crate::handlers::{admin, protected, public};
use crate::middleware::{admin_auth_middleware, api_key_middleware, telemetry_middleware, KeyGuard};
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let router = Router::new()
        .merge(public_routes())
        .merge(api_routes(&state))
        .merge(admin_routes(&state))
        .fallback(not_found)
        // Every request, including rejected and unmatched ones, produces one observation
        .layer(from_fn_with_state(state.telemetry.clone(), telemetry_middleware))
        .layer(CorsLayer::permissive());

    let router = if state.config.server.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };
    router.with_state(state)
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
}

/// Key-gated routes, grouped by the capability each group requires
fn api_routes(state: &AppState) -> Router<AppState> {
    let guard = |required| from_fn_with_state(KeyGuard::require(state, required), api_key_middleware);

    let read_media = Router::new()
        .route("/api/media", get(protected::media_list))
        .route("/api/media/:id", get(protected::media_get))
        .route_layer(guard(capability::READ_MEDIA));

    let write_media = Router::new()
        .route("/api/media", post(protected::media_create))
        .route("/api/media/:id", put(protected::media_update))
        .route_layer(guard(capability::WRITE_MEDIA));

    let delete_media = Router::new()
        .route("/api/media/:id", axum::routing::delete(protected::media_delete))
        .route_layer(guard(capability::DELETE_MEDIA));

    let read_settings = Router::new()
        .route("/api/settings", get(protected::settings_get))
        .route_layer(guard(capability::READ_SETTINGS));

    let write_settings = Router::new()
        .route("/api/settings", put(protected::settings_update))
        .route_layer(guard(capability::WRITE_SETTINGS));

    let baseline = Router::new()
        .route("/api/ping", get(protected::ping))
        .route_layer(from_fn_with_state(KeyGuard::baseline(state), api_key_middleware));

    read_media
        .merge(write_media)
        .merge(delete_media)
        .merge(read_settings)
        .merge(write_settings)
        .merge(baseline)
}

fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Key lifecycle
        .route("/admin/keys", post(admin::keys::key_create).get(admin::keys::key_list))
        .route("/admin/keys/:id", axum::routing::delete(admin::keys::key_revoke))
        // Capability vocabulary
        .route("/admin/capabilities", get(admin::capabilities::capabilities_list))
        .route(
            "/admin/capabilities/validate",
            post(admin::capabilities::capabilities_validate),
        )
        // Analytics
        .route("/admin/analytics/summary", get(admin::analytics::analytics_summary))
        .route("/admin/analytics/realtime", get(admin::analytics::analytics_realtime))
        .route("/admin/analytics/keys", get(admin::analytics::analytics_keys))
        .route("/admin/analytics/flush", post(admin::analytics::analytics_flush))
        // Content management
        .route("/admin/media", post(protected::media_create))
        .route(
            "/admin/media/:id",
            put(protected::media_update).delete(protected::media_delete),
        )
        .route("/admin/settings", put(protected::settings_update))
        .route_layer(from_fn_with_state(state.clone(), admin_auth_middleware))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

// handlers/public/root.rs - GET / handler

use axum::response::Json;
use serde_json::{json, Value};

pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "MediaVault API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "health": "/health (public)",
                "media": "/api/media[/:id] (API key, read:media)",
                "settings": "/api/settings (API key, read:settings)",
                "ping": "/api/ping (API key, read)",
                "keys": "/admin/keys[/:id] (admin)",
                "analytics": "/admin/analytics/{summary,realtime,keys,flush} (admin)",
                "content": "/admin/media[/:id], /admin/settings (admin)",
            }
        }
    }))
}

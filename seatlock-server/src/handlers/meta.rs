//! `/health` and `/`.

use axum::Json;
use serde_json::{json, Value};

/// `GET /health`: liveness only, the store is not consulted.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /`: service name and entry points.
pub async fn api_info() -> Json<Value> {
    Json(json!({
        "message": "Seatlock event registration API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "users": "/api/v1/users",
            "events": "/api/v1/events",
            "registrations": "/api/v1/registrations",
            "health": "/health",
        },
    }))
}

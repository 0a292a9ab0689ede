//! Liveness and readiness endpoints.

use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use sea_orm::ConnectionTrait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(liveness))
        .route("/status", get(readiness))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Process is up")),
    tag = "Health"
)]
pub async fn liveness() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Readiness: verifies the database answers a trivial query.
#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Ready"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "Health"
)]
pub async fn readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let start = Instant::now();
    let db_ok = state
        .db
        .execute_unprepared("SELECT 1")
        .await
        .is_ok();
    let latency_ms = start.elapsed().as_millis() as u64;

    if db_ok {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": { "database": { "status": "up", "latency_ms": latency_ms } },
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "database": { "status": "down", "latency_ms": latency_ms } },
            })),
        )
    }
}

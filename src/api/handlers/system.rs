//! System endpoints: health check and device keepalive.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    sessions: usize,
}

/// Keepalive response.
#[derive(Debug, Serialize, ToSchema)]
pub struct KeepaliveResponse {
    status: &'static str,
}

/// `GET /health`: service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, current timestamp and the number of live device sessions.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            sessions: state.registry.len().await,
        }),
    )
}

/// `GET /api/keepalive`: pre-flight probe used by device clients before
/// they open the socket.
#[utoipa::path(
    get,
    path = "/api/keepalive",
    tag = "System",
    summary = "Device keepalive",
    responses(
        (status = 200, description = "Server reachable", body = KeepaliveResponse),
    )
)]
pub async fn keepalive_handler() -> impl IntoResponse {
    Json(KeepaliveResponse { status: "ok" })
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/keepalive", get(keepalive_handler))
}

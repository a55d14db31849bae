//! Liveness and readiness endpoints for the connector process.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::watch;

use crate::types::ConnectionState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "cloud-connector",
    })
}

async fn ready_handler(State(state): State<watch::Receiver<ConnectionState>>) -> impl IntoResponse {
    let current = *state.borrow();
    if current.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Build the health router.
///
/// `/health` always answers 200. `/ready` answers 200 only while the
/// connector is heartbeating.
#[must_use]
pub fn health_router(state: watch::Receiver<ConnectionState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

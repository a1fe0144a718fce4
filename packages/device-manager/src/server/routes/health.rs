use async_nats::connection::State as ConnectionState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    nats: String,
    pending_waits: usize,
}

/// Health check endpoint
///
/// Returns 200 OK while the broker connection is up (or not configured),
/// 503 Service Unavailable otherwise.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (healthy, nats) = match &state.deps.nats {
        None => (true, "not configured".to_string()),
        Some(client) => match client.connection_state() {
            ConnectionState::Connected => (true, "ok".to_string()),
            other => (false, format!("{other:?}").to_lowercase()),
        },
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            nats,
            pending_waits: state.deps.waiter.pending(),
        }),
    )
}

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::relay::ROOM_CAPACITY;
use crate::state::RelayState;

/// Health response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub rooms: usize,
    pub room_capacity: usize,
    pub timestamp: String,
}

/// Health routes
pub fn health_routes() -> Router<RelayState> {
    Router::new().route("/health", get(health_check))
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<RelayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        rooms: state.registry.room_count(),
        room_capacity: ROOM_CAPACITY,
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub mod health;

use axum::Router;

use crate::relay::ws_routes;
use crate::state::RelayState;

/// Create the relay router with all routes
pub fn create_router(state: RelayState) -> Router {
    Router::new()
        .merge(health::health_routes())
        .merge(ws_routes())
        .with_state(state)
}

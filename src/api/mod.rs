//! REST observability layer: health and state snapshot endpoints.
//!
//! The gateway's functional surface is the WebSocket; these endpoints
//! only expose read-only views for monitoring. Snapshot endpoints are
//! mounted under `/api/v1`.

pub mod handlers;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::snapshot_routes())
        .merge(handlers::system_routes())
}

//! Axum WebSocket upgrade handler.

use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::app_state::AppState;

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let chat = std::sync::Arc::clone(&state.chat);
    // interval() panics on a zero period; clamp to at least one second.
    let heartbeat = Duration::from_secs(state.heartbeat_interval_secs.max(1));

    ws.on_upgrade(move |socket| run_connection(socket, chat, heartbeat))
}

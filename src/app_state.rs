//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::ChatServer;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Presence and broadcast core.
    pub chat: Arc<ChatServer>,
    /// Seconds between server-initiated WebSocket pings.
    pub heartbeat_interval_secs: u64,
}

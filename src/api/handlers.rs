//! REST endpoint handlers: health, presence, rooms, delivery stats.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::app_state::AppState;
use crate::service::DeliveryCounters;

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    connections: usize,
    active_users: usize,
}

/// `GET /health` — Service health status with connection counts.
pub async fn health_handler(
    State(state): State<AppState>,
) -> impl IntoResponse {
    let connections = state.chat.connection_count().await;
    let active_users = state.chat.presence_snapshot().await.len();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connections,
            active_users,
        }),
    )
}

/// Presence snapshot response.
#[derive(Debug, Serialize)]
struct PresenceResponse {
    /// Active display names, in join order.
    names: Vec<String>,
}

/// `GET /api/v1/presence` — Active display names in join order.
pub async fn presence_handler(
    State(state): State<AppState>,
) -> impl IntoResponse {
    let names = state.chat.presence_snapshot().await;
    (StatusCode::OK, Json(PresenceResponse { names }))
}

/// One room's name and member count.
#[derive(Debug, Serialize)]
struct RoomSummary {
    name: String,
    members: usize,
}

/// `GET /api/v1/rooms` — All rooms with at least one member.
pub async fn rooms_handler(
    State(state): State<AppState>,
) -> impl IntoResponse {
    let mut rooms: Vec<RoomSummary> = state
        .chat
        .rooms_snapshot()
        .await
        .into_iter()
        .map(|(name, members)| RoomSummary { name, members })
        .collect();
    rooms.sort_by(|a, b| a.name.cmp(&b.name));
    (StatusCode::OK, Json(rooms))
}

/// Delivery counter response.
#[derive(Debug, Serialize)]
struct StatsResponse {
    delivery: DeliveryCounters,
}

/// `GET /api/v1/stats` — Broadcast delivery counters.
pub async fn stats_handler(
    State(state): State<AppState>,
) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StatsResponse {
            delivery: state.chat.delivery_counters(),
        }),
    )
}

/// System routes mounted at the root level (not under /api/v1).
pub fn system_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}

/// Read-only state snapshot routes, mounted under `/api/v1`.
pub fn snapshot_routes() -> Router<AppState> {
    Router::new()
        .route("/presence", get(presence_handler))
        .route("/rooms", get(rooms_handler))
        .route("/stats", get(stats_handler))
}

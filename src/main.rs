//! presence-gateway server entry point.
//!
//! Starts the Axum HTTP server with the WebSocket endpoint and the REST
//! observability endpoints.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use presence_gateway::api;
use presence_gateway::app_state::AppState;
use presence_gateway::config::GatewayConfig;
use presence_gateway::service::ChatServer;
use presence_gateway::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting presence-gateway");

    // Build the presence and broadcast core
    let chat = Arc::new(ChatServer::from_config(&config));

    // Build application state
    let app_state = AppState {
        chat,
        heartbeat_interval_secs: config.heartbeat_interval_secs,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

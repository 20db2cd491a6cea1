//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), with defaults suitable for local
//! development.

use std::net::SocketAddr;

use crate::domain::OverflowPolicy;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Capacity of each connection's outbound buffer, in frames.
    pub outbound_buffer_capacity: usize,

    /// What to do when a connection's outbound buffer is full and a
    /// reliable frame arrives.
    pub overflow_policy: OverflowPolicy,

    /// Seconds between server-initiated WebSocket pings.
    pub heartbeat_interval_secs: u64,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        let outbound_buffer_capacity = parse_env("OUTBOUND_BUFFER_CAPACITY", 256);
        let overflow_policy = parse_env("OUTBOUND_OVERFLOW_POLICY", OverflowPolicy::DropOldest);
        let heartbeat_interval_secs = parse_env("HEARTBEAT_INTERVAL_SECS", 30);

        Ok(Self {
            listen_addr,
            outbound_buffer_capacity,
            overflow_policy,
            heartbeat_interval_secs,
        })
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            outbound_buffer_capacity: 256,
            overflow_policy: OverflowPolicy::DropOldest,
            heartbeat_interval_secs: 30,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

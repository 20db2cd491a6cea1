//! # presence-gateway
//!
//! WebSocket gateway providing room-scoped presence tracking and broadcast
//! messaging.
//!
//! Clients connect over WebSocket, identify with a display name, and then
//! exchange chat events; the gateway tracks who is present, which rooms each
//! connection has joined, and fans events out to the resolved audience with
//! explicit reliable/volatile delivery semantics. Transport framing and
//! fallback negotiation are the WebSocket layer's concern; this crate is a
//! coordination core.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, REST observability)
//!     │
//!     ├── WS Handler (ws/)
//!     ├── REST Handlers (api/)
//!     │
//!     ├── ChatServer (service/)
//!     ├── BroadcastEngine (service/)
//!     │
//!     ├── ConnectionRegistry (domain/)
//!     ├── RoomIndex (domain/)
//!     ├── PresenceTracker (domain/)
//!     └── Outbound queues, one per connection (domain/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;

//! Service layer: session lifecycle and broadcast orchestration.
//!
//! [`ChatServer`] drives the per-connection state machine and delegates
//! fan-out to the [`broadcast::BroadcastEngine`].

pub mod broadcast;
pub mod session;

pub use broadcast::{BroadcastEngine, DeliveryCounters, DeliveryMode, Scope};
pub use session::ChatServer;

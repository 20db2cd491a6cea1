//! Domain layer: core presence and broadcast state.
//!
//! This module contains the server-side domain model: connection identity,
//! the connection registry, the room index, reference-counted presence
//! tracking, outbound queues, and the server event vocabulary.

pub mod connection_id;
pub mod event;
pub mod outbound;
pub mod presence;
pub mod registry;
pub mod rooms;

pub use connection_id::ConnectionId;
pub use event::ServerEvent;
pub use outbound::{EnqueueOutcome, OutboundReceiver, OutboundSender, OverflowPolicy};
pub use presence::PresenceTracker;
pub use registry::{ConnectionEntry, ConnectionRegistry, SessionState};
pub use rooms::RoomIndex;

//! Inbound WebSocket message types.
//!
//! Clients send the same envelope the server emits: `{"event": "...",
//! "data": {...}}`. Deserialization doubles as the dispatch table: each
//! variant maps one wire event name onto one session handler.

use serde::Deserialize;

/// Event received from a WebSocket client.
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Identify with a display name. First event on a connection.
    Join {
        /// Requested display name.
        name: String,
    },
    /// Send a chat message to everyone.
    ChatMessage {
        /// Message text.
        text: String,
    },
    /// Join a named room.
    JoinRoom {
        /// Room name.
        room: String,
    },
    /// Leave a named room.
    LeaveRoom {
        /// Room name.
        room: String,
    },
    /// Send a chat message to one room's members.
    RoomMessage {
        /// Target room.
        room: String,
        /// Message text.
        text: String,
    },
}

impl ClientEvent {
    /// Returns the wire event name for this variant.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::ChatMessage { .. } => "chatMessage",
            Self::JoinRoom { .. } => "joinRoom",
            Self::LeaveRoom { .. } => "leaveRoom",
            Self::RoomMessage { .. } => "roomMessage",
        }
    }
}

//! Outbound server events.
//!
//! Every state change the clients can observe is expressed as a
//! [`ServerEvent`], serialized once per publish and fanned out by the
//! broadcast engine. The wire envelope is `{"event": "...", "data": {...}}`
//! with camelCase field names.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Event broadcast to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// A display name became active (first session for that name).
    UserJoined {
        /// The name that joined.
        name: String,
        /// Server-side event time.
        timestamp: DateTime<Utc>,
    },

    /// A display name became inactive (last session disconnected).
    UserLeft {
        /// The name that left.
        name: String,
        /// Server-side event time.
        timestamp: DateTime<Utc>,
    },

    /// Full refresh of the active user list, in join order.
    UserList {
        /// All active names.
        names: Vec<String>,
        /// Server-side event time.
        timestamp: DateTime<Utc>,
    },

    /// A chat message relayed to every connection.
    ChatMessage {
        /// Sender's display name.
        user_name: String,
        /// Message text as received.
        text: String,
        /// Server-side relay time.
        timestamp: DateTime<Utc>,
    },

    /// A chat message scoped to one room's members.
    RoomMessage {
        /// Target room.
        room: String,
        /// Sender's display name.
        user_name: String,
        /// Message text as received.
        text: String,
        /// Server-side relay time.
        timestamp: DateTime<Utc>,
    },

    /// An error reported back to the originating connection only.
    Error {
        /// Human-readable reason.
        reason: String,
    },
}

impl ServerEvent {
    /// Returns the wire event name for this variant.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::UserJoined { .. } => "userJoined",
            Self::UserLeft { .. } => "userLeft",
            Self::UserList { .. } => "userList",
            Self::ChatMessage { .. } => "chatMessage",
            Self::RoomMessage { .. } => "roomMessage",
            Self::Error { .. } => "error",
        }
    }

    /// Builds a `userJoined` event stamped now.
    #[must_use]
    pub fn user_joined(name: impl Into<String>) -> Self {
        Self::UserJoined {
            name: name.into(),
            timestamp: Utc::now(),
        }
    }

    /// Builds a `userLeft` event stamped now.
    #[must_use]
    pub fn user_left(name: impl Into<String>) -> Self {
        Self::UserLeft {
            name: name.into(),
            timestamp: Utc::now(),
        }
    }

    /// Builds a `userList` event stamped now.
    #[must_use]
    pub fn user_list(names: Vec<String>) -> Self {
        Self::UserList {
            names,
            timestamp: Utc::now(),
        }
    }

    /// Builds a `chatMessage` event stamped now.
    #[must_use]
    pub fn chat_message(user_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::ChatMessage {
            user_name: user_name.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Builds a `roomMessage` event stamped now.
    #[must_use]
    pub fn room_message(
        room: impl Into<String>,
        user_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::RoomMessage {
            room: room.into(),
            user_name: user_name.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Builds an `error` event.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }
}

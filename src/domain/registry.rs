//! Connection registry: identity and lifecycle state per live connection.
//!
//! [`ConnectionRegistry`] owns every [`ConnectionEntry`] exclusively. It is
//! deliberately not synchronized internally: the service layer composes it
//! with the room index and presence tracker under a single lock, so the
//! membership invariants between the three can never be observed half-updated.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::ConnectionId;
use super::outbound::OutboundSender;
use crate::error::GatewayError;

/// Lifecycle state of a single connection.
///
/// `Identified` is transient: [`ConnectionRegistry::set_identity`] advances
/// through it to `Active` in one step, so no inbound event can observe a
/// connection parked there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport handshake done, no identity yet.
    Connecting,
    /// Display name assigned, activation pending.
    Identified,
    /// Fully active; may send and receive chat events.
    Active,
    /// Terminal. The entry is removed from the registry at this point.
    Disconnected,
}

impl SessionState {
    /// Returns `true` if the connection may send chat and room events.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// One live transport-level connection.
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Server-generated identifier.
    pub id: ConnectionId,
    /// Display name; `None` until the connection identifies.
    pub name: Option<String>,
    /// Names of rooms this connection is a member of. Always the inverse
    /// image of the room index memberships for this connection.
    pub rooms: HashSet<String>,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Handle to the connection's outbound queue.
    pub sender: OutboundSender,
    /// Handshake timestamp.
    pub connected_at: DateTime<Utc>,
}

/// Central store for all live connections. O(1) lookup by ID.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection in the `Connecting` state, returning its
    /// generated identifier.
    pub fn register(&mut self, sender: OutboundSender) -> ConnectionId {
        let id = ConnectionId::new();
        self.connections.insert(
            id,
            ConnectionEntry {
                id,
                name: None,
                rooms: HashSet::new(),
                state: SessionState::Connecting,
                sender,
                connected_at: Utc::now(),
            },
        );
        id
    }

    /// Returns the entry for the given connection, if it is live.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(&id)
    }

    /// Returns a mutable entry for the given connection, if it is live.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut ConnectionEntry> {
        self.connections.get_mut(&id)
    }

    /// Assigns a display name and advances the connection to `Active`.
    ///
    /// The name is trimmed before storage; the trimmed form is returned so
    /// callers use the exact key under which presence is tracked.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidIdentity`] if the name is empty or
    /// whitespace-only, or if the connection already carries an identity.
    /// Returns [`GatewayError::ConnectionNotFound`] for unknown IDs. On any
    /// error the entry is left untouched.
    pub fn set_identity(&mut self, id: ConnectionId, name: &str) -> Result<String, GatewayError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::InvalidIdentity("name is empty".to_string()));
        }
        let entry = self
            .connections
            .get_mut(&id)
            .ok_or(GatewayError::ConnectionNotFound(id))?;
        if entry.name.is_some() {
            return Err(GatewayError::InvalidIdentity(
                "connection already identified".to_string(),
            ));
        }
        entry.name = Some(trimmed.to_string());
        entry.state = SessionState::Identified;
        // Activation is immediate once an identity is set.
        entry.state = SessionState::Active;
        Ok(trimmed.to_string())
    }

    /// Removes a connection, returning its entry so dependent components
    /// can clean up rooms and presence. The outbound queue is closed so an
    /// in-flight broadcast naming this connection becomes a no-op.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        let mut entry = self.connections.remove(&id)?;
        entry.state = SessionState::Disconnected;
        entry.sender.close();
        Some(entry)
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterates over all live entries.
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionEntry> {
        self.connections.values()
    }
}

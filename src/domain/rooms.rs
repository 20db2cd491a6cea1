//! Room index: named broadcast scopes and their memberships.
//!
//! Rooms are created implicitly on first join and pruned as soon as the
//! last member leaves. Join and leave are idempotent. Like the registry,
//! the index carries no lock of its own; the service layer guards it
//! together with the registry so memberships never dangle.

use std::collections::{HashMap, HashSet};

use super::ConnectionId;

/// Maps room name to the set of member connections.
#[derive(Debug, Default)]
pub struct RoomIndex {
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RoomIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a room, creating the room if absent.
    ///
    /// Returns `true` if the connection was not already a member.
    pub fn join(&mut self, room: &str, id: ConnectionId) -> bool {
        self.rooms.entry(room.to_string()).or_default().insert(id)
    }

    /// Removes a connection from a room, pruning the room once empty.
    ///
    /// Returns `true` if the connection was a member. Leaving a room the
    /// connection is not in (or that does not exist) is a no-op.
    pub fn leave(&mut self, room: &str, id: ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&id);
        if members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }

    /// Returns the member set of a room. Empty for unknown rooms.
    #[must_use]
    pub fn members_of(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if the connection is a member of the room.
    #[must_use]
    pub fn is_member(&self, room: &str, id: ConnectionId) -> bool {
        self.rooms.get(room).is_some_and(|m| m.contains(&id))
    }

    /// Removes a connection from every room in `rooms`, pruning as it goes.
    /// Used on disconnect with the room set handed back by the registry.
    pub fn remove_connection(&mut self, rooms: &HashSet<String>, id: ConnectionId) {
        for room in rooms {
            let _ = self.leave(room, id);
        }
    }

    /// Returns each room's name and member count.
    #[must_use]
    pub fn summaries(&self) -> Vec<(String, usize)> {
        self.rooms
            .iter()
            .map(|(name, members)| (name.clone(), members.len()))
            .collect()
    }

    /// Returns the number of rooms with at least one member.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Returns `true` if no rooms exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

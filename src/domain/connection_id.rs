//! Type-safe connection identifier.
//!
//! [`ConnectionId`] is a newtype wrapper around [`uuid::Uuid`] (v4) providing
//! type safety so that connection identifiers cannot be confused with other
//! UUIDs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for one live transport-level connection.
///
/// Wraps a UUID v4. Generated once at transport handshake time and immutable
/// thereafter. Used as the dictionary key in [`super::ConnectionRegistry`],
/// room membership entry, and broadcast exclusion target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Creates a new random `ConnectionId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

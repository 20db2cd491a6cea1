//! Reference-counted presence tracking.
//!
//! A display name is present while at least one live, identified connection
//! holds it. Counting sessions per name makes join/leave notifications
//! deterministic when several connections share one name: only the first
//! session announces a join and only the last one announces a leave.
//!
//! Snapshots preserve insertion order so user lists render reproducibly.

use std::collections::HashMap;

/// The set of currently active display names, with per-name session counts.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    counts: HashMap<String, usize>,
    order: Vec<String>,
}

impl PresenceTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more session for `name`.
    ///
    /// Returns `true` if this is the first session for the name, in which
    /// case the caller should announce a join.
    pub fn mark_active(&mut self, name: &str) -> bool {
        let count = self.counts.entry(name.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.order.push(name.to_string());
            true
        } else {
            false
        }
    }

    /// Records one fewer session for `name`.
    ///
    /// Returns `true` if this was the last session, in which case the
    /// caller should announce a leave. Unknown names are a no-op returning
    /// `false`.
    pub fn mark_inactive(&mut self, name: &str) -> bool {
        let Some(count) = self.counts.get_mut(name) else {
            return false;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.counts.remove(name);
            self.order.retain(|n| n != name);
            true
        } else {
            false
        }
    }

    /// Returns all active names in the order they first joined.
    #[must_use]
    pub fn list_active(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Returns `true` if `name` has at least one active session.
    #[must_use]
    pub fn is_active(&self, name: &str) -> bool {
        self.counts.contains_key(name)
    }

    /// Returns the number of distinct active names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns `true` if no names are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

//! Broadcast engine: scope resolution and fan-out delivery.
//!
//! Publishing is two separate steps. [`resolve_scope`] is a pure function
//! from (scope, current state) to a target set, testable without any
//! delivery machinery. [`BroadcastEngine::deliver`] then serializes the
//! event once and enqueues the shared frame into each target's bounded
//! outbound queue. Delivery is fire-and-forget per target: a full or
//! vanished queue affects only that target, never its peers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::domain::outbound::Frame;
use crate::domain::{
    ConnectionId, ConnectionRegistry, EnqueueOutcome, OutboundSender, OverflowPolicy, RoomIndex,
    ServerEvent,
};

/// The audience of one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every live connection.
    All,
    /// Every live connection except the sender.
    AllExcept(ConnectionId),
    /// Members of one room.
    Room(String),
}

/// Delivery reliability for one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Buffered delivery under the engine's configured overflow policy.
    Reliable,
    /// Best-effort: if a target's buffer is full right now, the frame is
    /// dropped for that target without applying the overflow policy.
    Volatile,
}

/// Snapshot of the engine's delivery counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeliveryCounters {
    /// Frames successfully enqueued.
    pub delivered: u64,
    /// Volatile frames dropped because a target buffer was full.
    pub dropped_volatile: u64,
    /// Reliable frames that evicted or lost a frame to a full buffer.
    pub dropped_overflow: u64,
    /// Reliable frames refused under the reject policy.
    pub rejected_overflow: u64,
    /// Frames addressed to a connection that vanished mid-broadcast.
    pub unreachable: u64,
}

/// Resolves a scope against current state into a concrete target set.
///
/// Room membership is guaranteed live by construction, but targets are
/// still read back through the registry when senders are collected, so a
/// vanished connection degrades to a skipped target rather than an error.
#[must_use]
pub fn resolve_scope(
    scope: &Scope,
    registry: &ConnectionRegistry,
    rooms: &RoomIndex,
) -> Vec<ConnectionId> {
    match scope {
        Scope::All => registry.iter().map(|entry| entry.id).collect(),
        Scope::AllExcept(sender) => registry
            .iter()
            .map(|entry| entry.id)
            .filter(|id| id != sender)
            .collect(),
        Scope::Room(name) => rooms.members_of(name),
    }
}

/// Fans serialized events out to per-connection outbound queues.
#[derive(Debug)]
pub struct BroadcastEngine {
    policy: OverflowPolicy,
    delivered: AtomicU64,
    dropped_volatile: AtomicU64,
    dropped_overflow: AtomicU64,
    rejected_overflow: AtomicU64,
    unreachable: AtomicU64,
}

impl BroadcastEngine {
    /// Creates an engine with the given reliable-mode overflow policy.
    #[must_use]
    pub fn new(policy: OverflowPolicy) -> Self {
        Self {
            policy,
            delivered: AtomicU64::new(0),
            dropped_volatile: AtomicU64::new(0),
            dropped_overflow: AtomicU64::new(0),
            rejected_overflow: AtomicU64::new(0),
            unreachable: AtomicU64::new(0),
        }
    }

    /// Serializes `event` once and enqueues it to every target.
    ///
    /// Returns the number of targets that accepted the frame. Targets that
    /// vanished are skipped silently; overflow outcomes are counted and
    /// logged but never propagate.
    pub async fn deliver(
        &self,
        event: &ServerEvent,
        targets: &[OutboundSender],
        mode: DeliveryMode,
    ) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        let mut accepted = 0;
        for target in targets {
            let outcome = match mode {
                DeliveryMode::Reliable => {
                    target.enqueue(Arc::clone(&frame), self.policy).await
                }
                DeliveryMode::Volatile => {
                    target
                        .enqueue(Arc::clone(&frame), OverflowPolicy::DropNewest)
                        .await
                }
            };
            if self.record(event, mode, outcome) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Sends an event to a single connection with reliable delivery.
    /// Used for direct replies such as `error` events.
    pub async fn send_to(&self, event: &ServerEvent, target: &OutboundSender) -> EnqueueOutcome {
        let Some(frame) = encode(event) else {
            return EnqueueOutcome::Closed;
        };
        let outcome = target.enqueue(frame, self.policy).await;
        let _ = self.record(event, DeliveryMode::Reliable, outcome);
        outcome
    }

    /// Returns a snapshot of the delivery counters.
    #[must_use]
    pub fn counters(&self) -> DeliveryCounters {
        DeliveryCounters {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_volatile: self.dropped_volatile.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            rejected_overflow: self.rejected_overflow.load(Ordering::Relaxed),
            unreachable: self.unreachable.load(Ordering::Relaxed),
        }
    }

    /// Updates counters for one enqueue outcome. Returns `true` if the
    /// frame ended up queued for the target.
    fn record(&self, event: &ServerEvent, mode: DeliveryMode, outcome: EnqueueOutcome) -> bool {
        match outcome {
            EnqueueOutcome::Enqueued => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            EnqueueOutcome::DroppedOldest => {
                // The new frame was queued at the cost of the oldest one.
                self.delivered.fetch_add(1, Ordering::Relaxed);
                self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(event = event.event_name(), "outbound buffer evicted oldest frame");
                true
            }
            EnqueueOutcome::DroppedNewest => {
                match mode {
                    DeliveryMode::Volatile => {
                        self.dropped_volatile.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(event = event.event_name(), "volatile frame dropped");
                    }
                    DeliveryMode::Reliable => {
                        self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(event = event.event_name(), "outbound buffer dropped frame");
                    }
                }
                false
            }
            EnqueueOutcome::Rejected => {
                self.rejected_overflow.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(event = event.event_name(), "outbound buffer rejected frame");
                false
            }
            EnqueueOutcome::Closed => {
                // Target disconnected mid-broadcast. Not an error for anyone.
                self.unreachable.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

fn encode(event: &ServerEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::from(json.as_str())),
        Err(err) => {
            tracing::error!(event = event.event_name(), %err, "event serialization failed");
            None
        }
    }
}

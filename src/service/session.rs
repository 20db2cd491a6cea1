//! Session lifecycle controller.
//!
//! [`ChatServer`] owns the composed server state (registry, rooms,
//! presence) behind a single `RwLock` and drives the per-connection state
//! machine: `Connecting -> Identified -> Active -> Disconnected`.
//!
//! Relay handlers (chat, room messages) take the lock, resolve targets,
//! release, then deliver. Lifecycle handlers (identify, disconnect)
//! enqueue their `userJoined`/`userLeft`/`userList` frames while still
//! holding the write lock: the `userList` refresh is the authoritative
//! roster, and enqueueing under the lock keeps concurrent joins and
//! leaves from interleaving a fresh roster with a stale one in a
//! receiver's queue. Enqueue never blocks on a slow client, a full
//! buffer resolves immediately through the overflow policy.

use tokio::sync::RwLock;

use crate::config::GatewayConfig;
use crate::domain::outbound::outbound_channel;
use crate::domain::{
    ConnectionId, ConnectionRegistry, OutboundReceiver, OutboundSender, OverflowPolicy,
    PresenceTracker, RoomIndex, ServerEvent,
};
use crate::error::GatewayError;
use crate::service::broadcast::{
    BroadcastEngine, DeliveryCounters, DeliveryMode, Scope, resolve_scope,
};

/// Composed mutable server state. One lock guards all three components,
/// so the membership invariants between them hold at every observable
/// point: no dangling room membership, and each connection's room set is
/// exactly its room index memberships.
#[derive(Debug, Default)]
struct ServerState {
    registry: ConnectionRegistry,
    rooms: RoomIndex,
    presence: PresenceTracker,
}

impl ServerState {
    /// Resolves a scope and collects the targets' outbound handles.
    fn senders_for(&self, scope: &Scope) -> Vec<OutboundSender> {
        resolve_scope(scope, &self.registry, &self.rooms)
            .into_iter()
            .filter_map(|id| self.registry.get(id).map(|entry| entry.sender.clone()))
            .collect()
    }
}

/// Presence and broadcast core for one gateway instance.
///
/// Holds no ambient global state: multiple independent instances can run
/// side by side in one process, which the tests rely on.
#[derive(Debug)]
pub struct ChatServer {
    state: RwLock<ServerState>,
    engine: BroadcastEngine,
    outbound_capacity: usize,
}

impl ChatServer {
    /// Creates a server with the given per-connection buffer capacity and
    /// reliable-mode overflow policy.
    #[must_use]
    pub fn new(outbound_capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: RwLock::new(ServerState::default()),
            engine: BroadcastEngine::new(policy),
            outbound_capacity,
        }
    }

    /// Creates a server from gateway configuration.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.outbound_buffer_capacity, config.overflow_policy)
    }

    /// Registers a new transport connection in the `Connecting` state.
    ///
    /// Returns the connection's ID and the receiving half of its outbound
    /// queue, which the write loop drains.
    pub async fn connect(&self) -> (ConnectionId, OutboundReceiver) {
        let (tx, rx) = outbound_channel(self.outbound_capacity);
        let id = self.state.write().await.registry.register(tx);
        tracing::debug!(%id, "connection registered");
        (id, rx)
    }

    /// Handles a `join` event: assigns an identity and activates the
    /// connection.
    ///
    /// For the first session of a name this broadcasts `userJoined`
    /// followed by a `userList` refresh to everyone. Additional sessions
    /// of an existing name stay silent except for a `userList` sent to the
    /// joining connection itself.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidIdentity`] for blank names or double
    /// identification, with no state change and no broadcast. The caller
    /// reports the error to the sender only.
    pub async fn identify(&self, id: ConnectionId, name: &str) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        let name = state.registry.set_identity(id, name)?;
        let is_new = state.presence.mark_active(&name);
        let names = state.presence.list_active();

        // Enqueued under the write lock so the roster in this userList
        // can never be overtaken by an older one.
        if is_new {
            let targets = state.senders_for(&Scope::All);
            tracing::info!(%id, name, "user joined");
            let _ = self
                .engine
                .deliver(
                    &ServerEvent::user_joined(name),
                    &targets,
                    DeliveryMode::Reliable,
                )
                .await;
            let _ = self
                .engine
                .deliver(
                    &ServerEvent::user_list(names),
                    &targets,
                    DeliveryMode::Reliable,
                )
                .await;
        } else if let Some(own) = state.registry.get(id).map(|entry| entry.sender.clone()) {
            tracing::debug!(%id, name, "additional session for active user");
            let _ = self
                .engine
                .send_to(&ServerEvent::user_list(names), &own)
                .await;
        }
        Ok(())
    }

    /// Handles a `chatMessage` event: relays the text to every connection,
    /// sender included.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnidentifiedSender`] if the connection is
    /// not `Active`; the message is dropped and never broadcast.
    pub async fn chat(&self, id: ConnectionId, text: &str) -> Result<(), GatewayError> {
        let (name, targets) = {
            let state = self.state.read().await;
            let entry = state
                .registry
                .get(id)
                .ok_or(GatewayError::ConnectionNotFound(id))?;
            if !entry.state.is_active() {
                return Err(GatewayError::UnidentifiedSender);
            }
            let name = entry.name.clone().ok_or(GatewayError::UnidentifiedSender)?;
            (name, state.senders_for(&Scope::All))
        };

        let _ = self
            .engine
            .deliver(
                &ServerEvent::chat_message(name, text),
                &targets,
                DeliveryMode::Reliable,
            )
            .await;
        Ok(())
    }

    /// Handles a `joinRoom` event. Idempotent: re-joining is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRoom`] for blank room names and
    /// [`GatewayError::UnidentifiedSender`] for non-active connections.
    pub async fn join_room(&self, id: ConnectionId, room: &str) -> Result<(), GatewayError> {
        let room = valid_room_name(room)?;
        let mut state = self.state.write().await;
        let entry = state
            .registry
            .get(id)
            .ok_or(GatewayError::ConnectionNotFound(id))?;
        if !entry.state.is_active() {
            return Err(GatewayError::UnidentifiedSender);
        }
        state.rooms.join(room, id);
        if let Some(entry) = state.registry.get_mut(id) {
            entry.rooms.insert(room.to_string());
        }
        tracing::debug!(%id, room, "joined room");
        Ok(())
    }

    /// Handles a `leaveRoom` event. Idempotent: leaving a room the
    /// connection is not in is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRoom`] for blank room names and
    /// [`GatewayError::UnidentifiedSender`] for non-active connections.
    pub async fn leave_room(&self, id: ConnectionId, room: &str) -> Result<(), GatewayError> {
        let room = valid_room_name(room)?;
        let mut state = self.state.write().await;
        let entry = state
            .registry
            .get(id)
            .ok_or(GatewayError::ConnectionNotFound(id))?;
        if !entry.state.is_active() {
            return Err(GatewayError::UnidentifiedSender);
        }
        state.rooms.leave(room, id);
        if let Some(entry) = state.registry.get_mut(id) {
            entry.rooms.remove(room);
        }
        tracing::debug!(%id, room, "left room");
        Ok(())
    }

    /// Handles a `roomMessage` event: relays the text to the room's
    /// members, sender included.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnidentifiedSender`] for non-active
    /// connections and [`GatewayError::InvalidRoom`] if the sender is not
    /// a member of the room.
    pub async fn room_message(
        &self,
        id: ConnectionId,
        room: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        let room = valid_room_name(room)?;
        let (name, targets) = {
            let state = self.state.read().await;
            let entry = state
                .registry
                .get(id)
                .ok_or(GatewayError::ConnectionNotFound(id))?;
            if !entry.state.is_active() {
                return Err(GatewayError::UnidentifiedSender);
            }
            let name = entry.name.clone().ok_or(GatewayError::UnidentifiedSender)?;
            if !state.rooms.is_member(room, id) {
                return Err(GatewayError::InvalidRoom(format!("not a member of {room}")));
            }
            (name, state.senders_for(&Scope::Room(room.to_string())))
        };

        let _ = self
            .engine
            .deliver(
                &ServerEvent::room_message(room, name, text),
                &targets,
                DeliveryMode::Reliable,
            )
            .await;
        Ok(())
    }

    /// Handles transport close, voluntary or abrupt.
    ///
    /// Removes the connection, cleans up its room memberships, and, if
    /// this was the last session for its name, broadcasts `userLeft`
    /// followed by a `userList` refresh, in that order. Unknown IDs are a
    /// no-op so a race between close paths stays harmless.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut state = self.state.write().await;
        let Some(entry) = state.registry.unregister(id) else {
            return;
        };
        state.rooms.remove_connection(&entry.rooms, id);
        let name_left = entry
            .name
            .filter(|name| state.presence.mark_inactive(name));

        let Some(name) = name_left else {
            tracing::debug!(%id, "connection closed");
            return;
        };
        // Same write-lock enqueue as identify: the roster refresh stays
        // ordered against concurrent lifecycle changes.
        let names = state.presence.list_active();
        let targets = state.senders_for(&Scope::All);
        tracing::info!(%id, name, "user left");
        let _ = self
            .engine
            .deliver(
                &ServerEvent::user_left(name),
                &targets,
                DeliveryMode::Reliable,
            )
            .await;
        let _ = self
            .engine
            .deliver(
                &ServerEvent::user_list(names),
                &targets,
                DeliveryMode::Reliable,
            )
            .await;
    }

    /// Sends an `error` event to one connection only. Used to report
    /// rejected inbound events to their sender without any broadcast.
    pub async fn send_error(&self, id: ConnectionId, reason: &str) {
        let sender = {
            let state = self.state.read().await;
            state.registry.get(id).map(|entry| entry.sender.clone())
        };
        if let Some(sender) = sender {
            let _ = self.engine.send_to(&ServerEvent::error(reason), &sender).await;
        }
    }

    /// Publishes a server-originated event to an arbitrary scope with an
    /// explicit delivery mode. Returns the number of targets that accepted
    /// the frame.
    pub async fn broadcast(&self, event: &ServerEvent, scope: &Scope, mode: DeliveryMode) -> usize {
        let targets = self.state.read().await.senders_for(scope);
        self.engine.deliver(event, &targets, mode).await
    }

    /// Returns the active display names in join order.
    pub async fn presence_snapshot(&self) -> Vec<String> {
        self.state.read().await.presence.list_active()
    }

    /// Returns each room's name and member count.
    pub async fn rooms_snapshot(&self) -> Vec<(String, usize)> {
        self.state.read().await.rooms.summaries()
    }

    /// Returns the number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.registry.len()
    }

    /// Returns a snapshot of the delivery counters.
    #[must_use]
    pub fn delivery_counters(&self) -> DeliveryCounters {
        self.engine.counters()
    }
}

fn valid_room_name(room: &str) -> Result<&str, GatewayError> {
    let trimmed = room.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::InvalidRoom("room name is empty".to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::outbound::Frame;

    fn server() -> ChatServer {
        ChatServer::new(64, OverflowPolicy::DropOldest)
    }

    /// Drains every frame currently queued for a connection.
    async fn drain(rx: &mut OutboundReceiver) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        loop {
            let next = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
            match next {
                Ok(Some(frame)) => frames.push(parse(&frame)),
                _ => return frames,
            }
        }
    }

    fn parse(frame: &Frame) -> serde_json::Value {
        serde_json::from_str(frame).unwrap_or_default()
    }

    fn event_name(value: &serde_json::Value) -> &str {
        value.get("event").and_then(|v| v.as_str()).unwrap_or("")
    }

    #[tokio::test]
    async fn join_broadcasts_user_joined_and_list() {
        let server = server();
        let (a, mut rx_a) = server.connect().await;
        let (b, mut rx_b) = server.connect().await;

        assert!(server.identify(a, "alice").await.is_ok());
        assert!(server.identify(b, "bob").await.is_ok());

        let events_a = drain(&mut rx_a).await;
        // alice sees her own join pair plus bob's.
        let names: Vec<&str> = events_a.iter().map(event_name).collect();
        assert_eq!(names, vec!["userJoined", "userList", "userJoined", "userList"]);
        let Some(last_list) = events_a.last() else {
            panic!("no events for alice");
        };
        assert_eq!(
            last_list.pointer("/data/names"),
            Some(&serde_json::json!(["alice", "bob"]))
        );

        let events_b = drain(&mut rx_b).await;
        // bob was already registered when alice joined, so he sees both pairs.
        let names: Vec<&str> = events_b.iter().map(event_name).collect();
        assert_eq!(names, vec!["userJoined", "userList", "userJoined", "userList"]);
    }

    #[tokio::test]
    async fn blank_join_changes_nothing_and_stays_private() {
        let server = server();
        let (a, mut rx_a) = server.connect().await;
        let (c, mut rx_c) = server.connect().await;
        let _ = server.identify(a, "alice").await;
        let _ = drain(&mut rx_a).await;
        let _ = drain(&mut rx_c).await;

        for bad in ["", "   "] {
            let result = server.identify(c, bad).await;
            assert!(matches!(result, Err(GatewayError::InvalidIdentity(_))));
        }
        assert_eq!(server.presence_snapshot().await, vec!["alice"]);

        // No broadcast reached anyone; the error event is the caller's to
        // send, to c alone.
        server.send_error(c, "invalid identity: name is empty").await;
        let events_c = drain(&mut rx_c).await;
        let names: Vec<&str> = events_c.iter().map(event_name).collect();
        assert_eq!(names, vec!["error"]);
        assert!(drain(&mut rx_a).await.is_empty());
    }

    #[tokio::test]
    async fn chat_reaches_sender_and_peers() {
        let server = server();
        let (a, mut rx_a) = server.connect().await;
        let (b, mut rx_b) = server.connect().await;
        let _ = server.identify(a, "alice").await;
        let _ = server.identify(b, "bob").await;
        let _ = drain(&mut rx_a).await;
        let _ = drain(&mut rx_b).await;

        assert!(server.chat(a, "hi").await.is_ok());

        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx).await;
            let Some(chat) = events.first() else {
                panic!("chat event missing");
            };
            assert_eq!(event_name(chat), "chatMessage");
            assert_eq!(
                chat.pointer("/data/userName").and_then(|v| v.as_str()),
                Some("alice")
            );
            assert_eq!(
                chat.pointer("/data/text").and_then(|v| v.as_str()),
                Some("hi")
            );
        }
    }

    #[tokio::test]
    async fn chat_before_identify_is_rejected_and_dropped() {
        let server = server();
        let (a, mut rx_a) = server.connect().await;
        let (b, mut rx_b) = server.connect().await;
        let _ = server.identify(b, "bob").await;
        let _ = drain(&mut rx_b).await;

        let result = server.chat(a, "sneaky").await;
        assert!(matches!(result, Err(GatewayError::UnidentifiedSender)));
        assert!(drain(&mut rx_b).await.is_empty());
        let _ = drain(&mut rx_a).await;
    }

    #[tokio::test]
    async fn disconnect_emits_left_then_list() {
        let server = server();
        let (a, mut rx_a) = server.connect().await;
        let (b, mut rx_b) = server.connect().await;
        let _ = server.identify(a, "alice").await;
        let _ = server.identify(b, "bob").await;
        let _ = drain(&mut rx_a).await;
        let _ = drain(&mut rx_b).await;

        server.disconnect(a).await;

        let events = drain(&mut rx_b).await;
        let names: Vec<&str> = events.iter().map(event_name).collect();
        assert_eq!(names, vec!["userLeft", "userList"]);
        let Some(list) = events.last() else {
            panic!("userList missing");
        };
        assert_eq!(
            list.pointer("/data/names"),
            Some(&serde_json::json!(["bob"]))
        );
        assert_eq!(server.presence_snapshot().await, vec!["bob"]);
    }

    #[tokio::test]
    async fn shared_name_leaves_once() {
        let server = server();
        let (watcher, mut rx_w) = server.connect().await;
        let (s1, _rx1) = server.connect().await;
        let (s2, _rx2) = server.connect().await;
        let _ = server.identify(watcher, "watcher").await;
        let _ = server.identify(s1, "alice").await;
        let _ = server.identify(s2, "alice").await;
        let _ = drain(&mut rx_w).await;

        server.disconnect(s1).await;
        assert!(drain(&mut rx_w).await.is_empty());
        assert_eq!(
            server.presence_snapshot().await,
            vec!["watcher", "alice"]
        );

        server.disconnect(s2).await;
        let events = drain(&mut rx_w).await;
        let names: Vec<&str> = events.iter().map(event_name).collect();
        assert_eq!(names, vec!["userLeft", "userList"]);
        assert_eq!(server.presence_snapshot().await, vec!["watcher"]);
    }

    #[tokio::test]
    async fn concurrent_joins_never_deliver_stale_roster() {
        let server = std::sync::Arc::new(ChatServer::new(256, OverflowPolicy::DropOldest));
        let (watcher, mut rx_w) = server.connect().await;
        let _ = server.identify(watcher, "watcher").await;
        let _ = drain(&mut rx_w).await;

        let mut receivers = Vec::new();
        let mut handles = Vec::new();
        for n in 0..32 {
            let (id, rx) = server.connect().await;
            receivers.push(rx);
            let server = std::sync::Arc::clone(&server);
            handles.push(tokio::spawn(async move {
                let _ = server.identify(id, &format!("user-{n}")).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        // The last userList the watcher received must match the server's
        // presence, whatever order the joins landed in.
        let events = drain(&mut rx_w).await;
        let Some(last_list) = events.iter().rev().find(|e| event_name(e) == "userList") else {
            panic!("no userList delivered to watcher");
        };
        let roster: Vec<String> = last_list
            .pointer("/data/names")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        assert_eq!(roster, server.presence_snapshot().await);
        assert_eq!(roster.len(), 33);
    }

    #[tokio::test]
    async fn second_session_sends_list_to_joiner_only() {
        let server = server();
        let (s1, mut rx1) = server.connect().await;
        let (s2, mut rx2) = server.connect().await;
        let _ = server.identify(s1, "alice").await;
        let _ = drain(&mut rx1).await;
        let _ = drain(&mut rx2).await;

        let _ = server.identify(s2, "alice").await;
        let events2 = drain(&mut rx2).await;
        let names: Vec<&str> = events2.iter().map(event_name).collect();
        assert_eq!(names, vec!["userList"]);
        assert!(drain(&mut rx1).await.is_empty());
    }

    #[tokio::test]
    async fn room_message_scoped_to_members() {
        let server = server();
        let (a, mut rx_a) = server.connect().await;
        let (b, mut rx_b) = server.connect().await;
        let (c, mut rx_c) = server.connect().await;
        for (id, name) in [(a, "alice"), (b, "bob"), (c, "carol")] {
            let _ = server.identify(id, name).await;
        }
        let _ = server.join_room(a, "dev").await;
        let _ = server.join_room(b, "dev").await;
        for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
            let _ = drain(rx).await;
        }

        assert!(server.room_message(a, "dev", "standup?").await.is_ok());

        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx).await;
            let names: Vec<&str> = events.iter().map(event_name).collect();
            assert_eq!(names, vec!["roomMessage"]);
        }
        assert!(drain(&mut rx_c).await.is_empty());
    }

    #[tokio::test]
    async fn room_membership_shrinks_on_leave() {
        let server = server();
        let mut ids = Vec::new();
        let mut receivers = Vec::new();
        for name in ["alice", "bob", "carol"] {
            let (id, rx) = server.connect().await;
            let _ = server.identify(id, name).await;
            ids.push(id);
            receivers.push(rx);
        }
        for id in &ids {
            let _ = server.join_room(*id, "dev").await;
        }
        assert_eq!(server.rooms_snapshot().await, vec![("dev".to_string(), 3)]);

        let Some(first) = ids.first().copied() else {
            panic!("ids empty");
        };
        let _ = server.leave_room(first, "dev").await;
        assert_eq!(server.rooms_snapshot().await, vec![("dev".to_string(), 2)]);

        // Second leave is idempotent.
        let _ = server.leave_room(first, "dev").await;
        assert_eq!(server.rooms_snapshot().await, vec![("dev".to_string(), 2)]);
    }

    #[tokio::test]
    async fn room_message_requires_membership() {
        let server = server();
        let (a, mut rx_a) = server.connect().await;
        let _ = server.identify(a, "alice").await;
        let _ = drain(&mut rx_a).await;

        let result = server.room_message(a, "dev", "hello?").await;
        assert!(matches!(result, Err(GatewayError::InvalidRoom(_))));
    }

    #[tokio::test]
    async fn disconnect_clears_room_memberships() {
        let server = server();
        let (a, _rx_a) = server.connect().await;
        let (b, _rx_b) = server.connect().await;
        let _ = server.identify(a, "alice").await;
        let _ = server.identify(b, "bob").await;
        let _ = server.join_room(a, "dev").await;
        let _ = server.join_room(b, "dev").await;

        server.disconnect(a).await;
        assert_eq!(server.rooms_snapshot().await, vec![("dev".to_string(), 1)]);

        server.disconnect(b).await;
        assert!(server.rooms_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn broadcast_to_vanished_connection_is_noop() {
        let server = server();
        let (a, rx_a) = server.connect().await;
        let (b, mut rx_b) = server.connect().await;
        let _ = server.identify(a, "alice").await;
        let _ = server.identify(b, "bob").await;
        let _ = drain(&mut rx_b).await;

        // a's write loop died without a disconnect yet.
        drop(rx_a);
        assert!(server.chat(b, "anyone there?").await.is_ok());

        let events = drain(&mut rx_b).await;
        let names: Vec<&str> = events.iter().map(event_name).collect();
        assert_eq!(names, vec!["chatMessage"]);
        assert!(server.delivery_counters().unreachable >= 1);
    }

    #[tokio::test]
    async fn volatile_broadcast_observable_in_counters() {
        let server = ChatServer::new(1, OverflowPolicy::Reject);
        let (a, _rx_a) = server.connect().await;
        let _ = server.identify(a, "alice").await;
        // Capacity 1 and an undrained queue: the next volatile frame drops.
        let event = ServerEvent::chat_message("server", "tick");
        let _ = server.broadcast(&event, &Scope::All, DeliveryMode::Volatile).await;
        let _ = server.broadcast(&event, &Scope::All, DeliveryMode::Volatile).await;
        assert!(server.delivery_counters().dropped_volatile >= 1);
    }

    #[tokio::test]
    async fn independent_instances_do_not_share_state() {
        let one = server();
        let two = server();
        let (a, _rx) = one.connect().await;
        let _ = one.identify(a, "alice").await;
        assert_eq!(one.presence_snapshot().await, vec!["alice"]);
        assert!(two.presence_snapshot().await.is_empty());
    }
}

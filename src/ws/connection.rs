//! Per-connection WebSocket read/write loop.
//!
//! Each connection gets one task running [`run_connection`]: it dispatches
//! inbound client events to the session lifecycle handlers and drains the
//! connection's outbound queue into the socket. Rejected events turn into
//! an `error` event for this connection only; the loop itself only ends
//! when the transport closes.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use super::messages::ClientEvent;
use crate::domain::ConnectionId;
use crate::service::ChatServer;

/// Runs the read/write loop for a single WebSocket connection.
///
/// Registers the connection, then selects over three sources: inbound
/// frames from the client, outbound frames from the broadcast engine, and
/// the heartbeat timer. On any exit path the connection is handed to
/// [`ChatServer::disconnect`] for cleanup.
pub async fn run_connection(
    socket: WebSocket,
    chat: std::sync::Arc<ChatServer>,
    heartbeat_interval: Duration,
) {
    let (conn_id, mut outbound) = chat.connect().await;
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    // The first tick completes immediately; consume it so pings start one
    // full interval after the handshake.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(&chat, conn_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            // Frame from the outbound queue
            frame = outbound.recv() => {
                match frame {
                    Some(json) => {
                        if ws_tx.send(Message::text(json.as_ref())).await.is_err() {
                            break;
                        }
                    }
                    // Queue closed server-side; nothing more will come.
                    None => break,
                }
            }
            // Transport liveness probe
            _ = heartbeat.tick() => {
                if ws_tx.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    chat.disconnect(conn_id).await;
    tracing::debug!(%conn_id, "ws connection closed");
}

/// Parses one inbound text frame and routes it to the matching session
/// handler. Any rejection is reported back to this connection alone.
async fn dispatch(chat: &ChatServer, conn_id: ConnectionId, text: &str) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(%conn_id, %err, "malformed client event");
            chat.send_error(conn_id, "malformed event").await;
            return;
        }
    };

    let result = match &event {
        ClientEvent::Join { name } => chat.identify(conn_id, name).await,
        ClientEvent::ChatMessage { text } => chat.chat(conn_id, text).await,
        ClientEvent::JoinRoom { room } => chat.join_room(conn_id, room).await,
        ClientEvent::LeaveRoom { room } => chat.leave_room(conn_id, room).await,
        ClientEvent::RoomMessage { room, text } => chat.room_message(conn_id, room, text).await,
    };

    if let Err(err) = result {
        tracing::debug!(%conn_id, event = event.event_name(), %err, "client event rejected");
        chat.send_error(conn_id, &err.to_string()).await;
    }
}

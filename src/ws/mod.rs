//! WebSocket layer: upgrade handling, the per-connection loop, and the
//! inbound event vocabulary.
//!
//! The WebSocket endpoint at `/ws` is the gateway's primary surface:
//! clients identify, chat, and join rooms through it, and receive all
//! presence and chat broadcasts back over the same socket.

pub mod connection;
pub mod handler;
pub mod messages;

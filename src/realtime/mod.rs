//! Real-time fan-out to connected clients.
//!
//! Rooms are transport-agnostic; `http::websocket` adapts them to
//! WebSocket sessions.

pub mod rooms;

pub use rooms::{Mailbox, RoomBroadcaster, SubscriberId};

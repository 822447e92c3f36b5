//! WebSocket sessions over room fan-out.
//!
//! # Responsibilities
//! - Upgrade `GET /ws` and register the connection as a room subscriber
//! - Parse client actions (join, leave, broadcast, direct)
//! - Write the subscriber's mailbox to the socket in order
//!
//! # Data Flow
//! ```text
//! client frame → action → RoomBroadcaster → member mailboxes
//! mailbox → writer task → client frame
//! ```
//!
//! # Design Decisions
//! - Every connection joins the lobby room on connect
//! - Replies (welcome, acks, errors) go through the mailbox too, so they
//!   keep their order relative to room traffic
//! - Broadcasts skip the sender unless `exclude_sender` is false
//! - Close frame, socket error, or gateway shutdown ends the session and
//!   removes the subscriber from every room

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::http::server::AppState;
use crate::observability::metrics;
use crate::realtime::{RoomBroadcaster, SubscriberId};

/// Message shape delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<SubscriberId>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            room: None,
            from: None,
        }
    }

    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn from_subscriber(mut self, from: SubscriberId) -> Self {
        self.from = Some(from);
        self
    }

    /// Serialize once; every recipient shares the same text.
    pub fn to_frame(&self) -> Arc<str> {
        match serde_json::to_string(self) {
            Ok(text) => text.into(),
            Err(_) => Arc::from(r#"{"type":"error","data":{"message":"unserializable message"}}"#),
        }
    }
}

fn default_exclude_sender() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientAction {
    Join {
        room: String,
    },
    Leave {
        room: String,
    },
    Broadcast {
        room: String,
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        data: Value,
        #[serde(default = "default_exclude_sender")]
        exclude_sender: bool,
    },
    Direct {
        to: SubscriberId,
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        data: Value,
    },
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| session(socket, state))
}

async fn session(socket: WebSocket, state: AppState) {
    let mut shutdown = state.shutdown.subscribe();
    let rooms = state.rooms.clone();
    let (id, mut mailbox) = rooms.connect();
    let lobby = state.config.realtime.lobby_room.clone();
    rooms.join(&lobby, id);
    metrics::record_ws_connections(rooms.subscriber_count());
    info!(subscriber = %id, "WebSocket session opened");

    rooms.send_direct(
        id,
        Envelope::new("welcome", json!({ "subscriber_id": id, "rooms": [lobby] })).to_frame(),
    );

    let (mut sink, mut stream) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(frame) = mailbox.recv().await {
            if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_action(&rooms, id, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(subscriber = %id, error = %e, "WebSocket read failed");
                    break;
                }
            },
            _ = shutdown.recv() => {
                debug!(subscriber = %id, "Closing WebSocket session for shutdown");
                break;
            }
        }
    }

    rooms.disconnect(id);
    let _ = writer.await;
    metrics::record_ws_connections(rooms.subscriber_count());
    info!(subscriber = %id, "WebSocket session closed");
}

fn handle_action(rooms: &RoomBroadcaster<Arc<str>>, id: SubscriberId, text: &str) {
    let action = match serde_json::from_str::<ClientAction>(text) {
        Ok(action) => action,
        Err(e) => {
            reply(rooms, id, "error", json!({ "message": format!("invalid action: {e}") }));
            return;
        }
    };

    match action {
        ClientAction::Join { room } => {
            let joined = rooms.join(&room, id);
            reply(rooms, id, "joined", json!({ "room": room, "changed": joined }));
        }
        ClientAction::Leave { room } => {
            let left = rooms.leave(&room, id);
            reply(rooms, id, "left", json!({ "room": room, "changed": left }));
        }
        ClientAction::Broadcast {
            room,
            kind,
            data,
            exclude_sender,
        } => {
            let frame = Envelope::new(kind, data).in_room(&room).from_subscriber(id).to_frame();
            let skip = exclude_sender.then_some(id);
            let delivered = rooms.broadcast(&room, frame, skip);
            reply(rooms, id, "delivered", json!({ "room": room, "recipients": delivered }));
        }
        ClientAction::Direct { to, kind, data } => {
            let frame = Envelope::new(kind, data).from_subscriber(id).to_frame();
            if rooms.send_direct(to, frame) {
                reply(rooms, id, "delivered", json!({ "to": to, "recipients": 1 }));
            } else {
                reply(rooms, id, "error", json!({ "message": format!("unknown subscriber {to}") }));
            }
        }
    }
}

fn reply(rooms: &RoomBroadcaster<Arc<str>>, id: SubscriberId, kind: &str, data: Value) {
    rooms.send_direct(id, Envelope::new(kind, data).to_frame());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_parse() {
        let action: ClientAction =
            serde_json::from_str(r#"{"action":"broadcast","room":"r1","type":"chat","data":{"text":"hi"}}"#).unwrap();
        match action {
            ClientAction::Broadcast { room, kind, exclude_sender, .. } => {
                assert_eq!(room, "r1");
                assert_eq!(kind, "chat");
                assert!(exclude_sender);
            }
            other => panic!("unexpected action {other:?}"),
        }

        assert!(serde_json::from_str::<ClientAction>(r#"{"action":"dance"}"#).is_err());
    }

    #[test]
    fn test_envelope_omits_absent_fields() {
        let frame = Envelope::new("user_created", json!({ "user_id": "u-1" })).to_frame();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({ "type": "user_created", "data": { "user_id": "u-1" } }));
    }

    #[test]
    fn test_broadcast_action_skips_sender_and_acks() {
        let rooms = RoomBroadcaster::<Arc<str>>::new();
        let (a, mut a_box) = rooms.connect();
        let (b, mut b_box) = rooms.connect();
        rooms.join("r1", a);
        rooms.join("r1", b);

        handle_action(&rooms, a, r#"{"action":"broadcast","room":"r1","type":"chat","data":"hi"}"#);

        let received: Envelope = serde_json::from_str(&b_box.try_recv().unwrap()).unwrap();
        assert_eq!(received.kind, "chat");
        assert_eq!(received.from, Some(a));
        assert_eq!(received.room.as_deref(), Some("r1"));

        let ack: Envelope = serde_json::from_str(&a_box.try_recv().unwrap()).unwrap();
        assert_eq!(ack.kind, "delivered");
        assert_eq!(ack.data["recipients"], 1);
        assert!(a_box.try_recv().is_err());
    }
}

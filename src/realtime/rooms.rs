//! Room-scoped fan-out.
//!
//! # Responsibilities
//! - Register subscriber mailboxes and hand out their handles
//! - Track named rooms of subscribers (join/leave, both idempotent)
//! - Deliver a message to every current member of a room, optionally
//!   skipping the sender, or to one subscriber directly
//!
//! # Design Decisions
//! - Membership is snapshotted when a broadcast starts; later joiners may
//!   miss it (no buffering or replay)
//! - Mailboxes are unbounded FIFO channels, so messages from one publisher
//!   reach each subscriber in publish order and publishing never blocks
//! - Empty rooms are removed; mailboxes found closed are pruned on delivery
//! - The payload type is the transport's business, not this module's

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::observability::metrics;

/// Handle identifying one subscriber (one WebSocket connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SubscriberId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Receiving end of a subscriber's mailbox.
pub type Mailbox<M> = mpsc::UnboundedReceiver<M>;

/// Named groups of subscribers with fan-out delivery.
#[derive(Debug)]
pub struct RoomBroadcaster<M> {
    subscribers: DashMap<SubscriberId, mpsc::UnboundedSender<M>>,
    rooms: DashMap<String, HashSet<SubscriberId>>,
}

impl<M> Default for RoomBroadcaster<M> {
    fn default() -> Self {
        Self {
            subscribers: DashMap::new(),
            rooms: DashMap::new(),
        }
    }
}

impl<M: Clone> RoomBroadcaster<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its handle and mailbox.
    pub fn connect(&self) -> (SubscriberId, Mailbox<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriberId::new();
        self.subscribers.insert(id, tx);
        tracing::debug!(subscriber = %id, "Subscriber connected");
        (id, rx)
    }

    /// Forget a subscriber and remove it from every room.
    pub fn disconnect(&self, subscriber: SubscriberId) {
        self.subscribers.remove(&subscriber);
        self.rooms.retain(|_, members| {
            members.remove(&subscriber);
            !members.is_empty()
        });
        tracing::debug!(subscriber = %subscriber, "Subscriber disconnected");
    }

    /// Add `subscriber` to `room`. Returns false if it was already a member
    /// or is not connected.
    pub fn join(&self, room: &str, subscriber: SubscriberId) -> bool {
        if !self.subscribers.contains_key(&subscriber) {
            tracing::warn!(room, subscriber = %subscriber, "Join from unknown subscriber ignored");
            return false;
        }
        let added = self
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(subscriber);

        // A disconnect that ran between the check and the insert would have
        // missed this room; take the entry back out.
        if added && !self.subscribers.contains_key(&subscriber) {
            self.rooms.remove_if_mut(room, |_, members| {
                members.remove(&subscriber);
                members.is_empty()
            });
            tracing::debug!(room, subscriber = %subscriber, "Join raced with disconnect; undone");
            return false;
        }

        if added {
            tracing::debug!(room, subscriber = %subscriber, "Joined room");
        }
        added
    }

    /// Remove `subscriber` from `room`. Returns false if it was not a member.
    pub fn leave(&self, room: &str, subscriber: SubscriberId) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(mut members) => members.remove(&subscriber),
            None => return false,
        };
        self.rooms.remove_if(room, |_, members| members.is_empty());
        if removed {
            tracing::debug!(room, subscriber = %subscriber, "Left room");
        }
        removed
    }

    /// Deliver `message` to every current member of `room`, skipping
    /// `sender` if given. Returns the number of deliveries.
    pub fn broadcast(&self, room: &str, message: M, sender: Option<SubscriberId>) -> usize {
        let members: Vec<SubscriberId> = match self.rooms.get(room) {
            Some(members) => members
                .iter()
                .filter(|id| Some(**id) != sender)
                .copied()
                .collect(),
            None => Vec::new(),
        };

        let mut delivered = 0;
        let mut gone = Vec::new();
        for id in members {
            if self.deliver(id, message.clone()) {
                delivered += 1;
            } else {
                gone.push(id);
            }
        }

        for id in gone {
            tracing::debug!(room, subscriber = %id, "Pruning closed mailbox");
            self.disconnect(id);
        }

        metrics::record_broadcast(delivered);
        tracing::trace!(room, delivered, "Broadcast complete");
        delivered
    }

    /// Deliver `message` to one subscriber regardless of rooms.
    pub fn send_direct(&self, subscriber: SubscriberId, message: M) -> bool {
        let delivered = self.deliver(subscriber, message);
        if !delivered {
            self.disconnect(subscriber);
        }
        delivered
    }

    fn deliver(&self, subscriber: SubscriberId, message: M) -> bool {
        match self.subscribers.get(&subscriber) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Current members of `room`.
    pub fn members(&self, room: &str) -> Vec<SubscriberId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, room: &str, subscriber: SubscriberId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(&subscriber))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

//! A connected client as seen by the hub.
//!
//! The hub only holds `Arc<Connection>` references. The queue receiver and the
//! transport belong to the connection's own pump tasks.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use super::value::{ChannelId, ChatRoomKey, Identity, UserId};

/// A serialized wire frame waiting in an outbound queue.
pub type Outbound = Arc<str>;

/// Receiving half of a connection's outbound queue, drained by the writer.
pub type OutboundReceiver = mpsc::Receiver<Outbound>;

/// Unique per physical connection; a user reconnecting gets a new one.
pub type ConnectionId = Uuid;

/// Result of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The bounded queue is full; the consumer is too slow.
    Full,
    /// The queue was already closed.
    Closed,
}

/// Client connection state shared between the hub and the pump.
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    connected_at: DateTime<Utc>,
    /// Channels this connection is a member of. Mutated only under the hub's write lock.
    channels: Mutex<HashSet<ChannelId>>,
    chat_rooms: Mutex<HashSet<ChatRoomKey>>,
    /// `None` once closed. Dropping the only sender ends the writer's `recv` loop.
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
    dropped: AtomicU64,
}

impl Connection {
    /// Create a connection with a bounded outbound queue of `capacity` frames.
    pub fn new(
        identity: Identity,
        capacity: usize,
        connected_at: DateTime<Utc>,
    ) -> (Arc<Self>, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let connection = Arc::new(Self {
            id: Uuid::new_v4(),
            identity,
            connected_at,
            channels: Mutex::new(HashSet::new()),
            chat_rooms: Mutex::new(HashSet::new()),
            outbound: Mutex::new(Some(tx)),
            dropped: AtomicU64::new(0),
        });
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Try to enqueue a frame without waiting.
    pub fn try_deliver(&self, frame: Outbound) -> Delivery {
        let outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return Delivery::Closed;
        };
        match tx.try_send(frame) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Full
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Close the outbound queue. Frames already queued are still drained by
    /// the writer, which then sends a close frame.
    ///
    /// Returns `false` if the queue was already closed.
    pub fn close(&self) -> bool {
        self.outbound.lock().take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.lock().is_none()
    }

    /// Frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.channels.lock().iter().copied().collect();
        ids.sort();
        ids
    }

    pub fn in_channel(&self, channel_id: ChannelId) -> bool {
        self.channels.lock().contains(&channel_id)
    }

    pub(crate) fn add_channel(&self, channel_id: ChannelId) {
        let _ = self.channels.lock().insert(channel_id);
    }

    pub(crate) fn remove_channel(&self, channel_id: ChannelId) -> bool {
        self.channels.lock().remove(&channel_id)
    }

    pub fn chat_rooms(&self) -> Vec<ChatRoomKey> {
        let mut rooms: Vec<ChatRoomKey> = self.chat_rooms.lock().iter().cloned().collect();
        rooms.sort();
        rooms
    }

    pub(crate) fn add_chat_room(&self, key: ChatRoomKey) {
        let _ = self.chat_rooms.lock().insert(key);
    }

    pub(crate) fn remove_chat_room(&self, key: &ChatRoomKey) -> bool {
        self.chat_rooms.lock().remove(key)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.identity.user_id)
            .field("username", &self.identity.username)
            .field("closed", &self.is_closed())
            .finish()
    }
}

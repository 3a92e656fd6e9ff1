//! Hub: owner of the Membership Store and every fan-out path.
//!
//! Structural changes (register, unregister, join, leave, typing state) take
//! the write lock. Fan-out takes the read lock, so broadcasts issued from the
//! coordinator, the persistence tasks and the Broadcast Bridge run in
//! parallel. Nothing is ever sent while the write lock is held.

use std::sync::Arc;

use agora_shared::time::Clock;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::{DuplicatePolicy, HubConfig};
use crate::domain::{
    AccessChecker, ChannelId, ChatRoomKey, Connection, Delivery, Identity, MessageStore,
    Outbound, UserDisplay, UserId,
};
use crate::infrastructure::dto::websocket::{Envelope, MessageType, encode};

use super::membership::{Membership, MembershipSnapshot};

pub struct Hub {
    pub(super) membership: RwLock<Membership>,
    store: Arc<dyn MessageStore>,
    access: Arc<dyn AccessChecker>,
    clock: Arc<dyn Clock>,
    config: HubConfig,
}

impl Hub {
    pub fn new(
        config: HubConfig,
        store: Arc<dyn MessageStore>,
        access: Arc<dyn AccessChecker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            membership: RwLock::new(Membership::new()),
            store,
            access,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn access(&self) -> &Arc<dyn AccessChecker> {
        &self.access
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Add a connection to the client table and announce it online.
    pub async fn register(&self, connection: Arc<Connection>) {
        {
            let mut membership = self.membership.write().await;
            if let Some(previous) = membership.insert_client(Arc::clone(&connection)) {
                match self.config.duplicate_policy {
                    DuplicatePolicy::ClosePrevious => {
                        let _ = previous.close();
                        let left = membership.remove_connection(&previous);
                        info!(
                            user_id = %previous.user_id(),
                            conn_id = %previous.id(),
                            channels = left.len(),
                            "closed superseded connection"
                        );
                    }
                    DuplicatePolicy::KeepPrevious => {
                        debug!(
                            user_id = %previous.user_id(),
                            conn_id = %previous.id(),
                            "superseded connection left open"
                        );
                    }
                }
            }
        }
        info!(
            user_id = %connection.user_id(),
            username = connection.username(),
            conn_id = %connection.id(),
            "user connected"
        );
        self.broadcast_presence(connection.identity(), true).await;
    }

    /// Remove a connection from every channel and the client table, then close
    /// its queue. `user_offline` is emitted only when the user has no other
    /// registered connection.
    pub async fn unregister(&self, connection: &Arc<Connection>) {
        let (left, still_online) = {
            let mut membership = self.membership.write().await;
            let left = membership.remove_connection(connection);
            let still_online = membership.client(connection.user_id()).is_some();
            (left, still_online)
        };
        let _ = connection.close();
        info!(
            user_id = %connection.user_id(),
            username = connection.username(),
            conn_id = %connection.id(),
            channels = left.len(),
            dropped = connection.drop_count(),
            connected_ms = (self.now() - connection.connected_at()).num_milliseconds(),
            "user disconnected"
        );
        if !still_online {
            self.broadcast_presence(connection.identity(), false).await;
        }
    }

    /// Join the user's registered connection to a channel.
    pub async fn join_channel(&self, channel_id: ChannelId, user_id: UserId) -> bool {
        let mut membership = self.membership.write().await;
        let Some(connection) = membership.client(user_id).cloned() else {
            debug!(%user_id, %channel_id, "join from unregistered user ignored");
            return false;
        };
        let _ = membership.join(channel_id, &connection);
        true
    }

    /// Remove the user from a channel and clear their typing state there.
    pub async fn leave_channel(&self, channel_id: ChannelId, user_id: UserId) {
        let mut membership = self.membership.write().await;
        let _ = membership.leave(channel_id, user_id);
    }

    pub async fn set_channel_typing(&self, channel_id: ChannelId, user_id: UserId, typing: bool) {
        let mut membership = self.membership.write().await;
        membership.set_channel_typing(channel_id, user_id, typing);
    }

    pub async fn set_chat_typing(&self, key: &ChatRoomKey, user_id: UserId, typing: bool) {
        let mut membership = self.membership.write().await;
        membership.set_chat_typing(key, user_id, typing);
    }

    /// Record (`joined = true`) or drop a chat-room key on the user's connection.
    /// Leaving also clears the user's typing state in that room.
    pub async fn update_chat_room(&self, key: ChatRoomKey, user_id: UserId, joined: bool) {
        let mut membership = self.membership.write().await;
        let Some(connection) = membership.client(user_id).cloned() else {
            return;
        };
        if joined {
            connection.add_chat_room(key);
        } else {
            let _ = connection.remove_chat_room(&key);
            membership.set_chat_typing(&key, user_id, false);
        }
    }

    /// Deliver to every channel member except the originator, evicting any
    /// recipient whose queue rejects the frame.
    ///
    /// The fan-out runs as its own task under `broadcast_timeout`; a panic or
    /// timeout inside it is logged and does not reach the caller.
    pub async fn broadcast_to_channel(self: &Arc<Self>, envelope: Envelope) {
        let channel_id = envelope.channel_id;
        let kind = envelope.kind.clone();
        let hub = Arc::clone(self);
        let task = tokio::spawn(async move { hub.fan_out_channel(envelope).await });
        let abort = task.abort_handle();
        match timeout(self.config.broadcast_timeout(), task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(%channel_id, %kind, error = %e, "channel broadcast task failed");
            }
            Err(_) => {
                abort.abort();
                warn!(%channel_id, %kind, "channel broadcast timed out, abandoned");
            }
        }
    }

    async fn fan_out_channel(&self, envelope: Envelope) {
        let Some(frame) = serialize(&envelope) else {
            return;
        };
        let origin = envelope.origin();
        let mut failed = Vec::new();
        let mut recipients = 0usize;
        {
            let membership = self.membership.read().await;
            for connection in membership.members(envelope.channel_id) {
                if connection.user_id() == origin {
                    continue;
                }
                recipients += 1;
                match connection.try_deliver(Arc::clone(&frame)) {
                    Delivery::Delivered => {}
                    outcome => {
                        warn!(
                            user_id = %connection.user_id(),
                            channel_id = %envelope.channel_id,
                            ?outcome,
                            "outbound queue rejected message, evicting"
                        );
                        failed.push(Arc::clone(connection));
                    }
                }
            }
        }
        debug!(
            channel_id = %envelope.channel_id,
            kind = %envelope.kind,
            recipients,
            evicted = failed.len(),
            "broadcast to channel"
        );
        if !failed.is_empty() {
            self.evict(&failed).await;
        }
    }

    async fn evict(&self, connections: &[Arc<Connection>]) {
        let mut membership = self.membership.write().await;
        for connection in connections {
            let _ = connection.close();
            let _ = membership.remove_connection(connection);
        }
    }

    /// Typing fan-out: the originator is skipped and a full queue only drops the frame.
    pub async fn broadcast_to_channel_soft(&self, envelope: &Envelope) {
        let Some(frame) = serialize(envelope) else {
            return;
        };
        let origin = envelope.origin();
        let membership = self.membership.read().await;
        for connection in membership.members(envelope.channel_id) {
            if connection.user_id() != origin {
                deliver_soft(connection, &frame, &envelope.kind);
            }
        }
    }

    /// Online/offline event to every connected client. Never evicts.
    pub async fn broadcast_presence(&self, identity: &Identity, online: bool) {
        let kind = if online {
            MessageType::UserOnline
        } else {
            MessageType::UserOffline
        };
        let mut envelope = Envelope::new(kind, self.now());
        envelope.user_id = identity.user_id;
        envelope.username = identity.username.clone();
        envelope.pfp_path = identity.pfp_path.clone();
        envelope.data = Some(serde_json::json!({ "online": online }));
        let Some(frame) = serialize(&envelope) else {
            return;
        };
        let membership = self.membership.read().await;
        for connection in membership.clients() {
            deliver_soft(connection, &frame, &envelope.kind);
        }
    }

    /// Best-effort delivery to a user's registered connection.
    /// Returns `false` when the user is offline or the frame was dropped.
    pub async fn send_to_user(&self, user_id: UserId, envelope: &Envelope) -> bool {
        let connection = {
            let membership = self.membership.read().await;
            membership.client(user_id).cloned()
        };
        match connection {
            Some(connection) => self.send_to_connection(&connection, envelope),
            None => false,
        }
    }

    /// Best-effort delivery to one specific connection.
    pub fn send_to_connection(&self, connection: &Connection, envelope: &Envelope) -> bool {
        serialize(envelope).is_some_and(|frame| deliver_soft(connection, &frame, &envelope.kind))
    }

    /// Username and avatar of a user, `"Unknown"` when the lookup fails.
    pub async fn user_display(&self, user_id: UserId) -> UserDisplay {
        match self.store.fetch_user_display(user_id).await {
            Ok(display) => display,
            Err(e) => {
                warn!(%user_id, error = %e, "user lookup failed");
                UserDisplay::unknown()
            }
        }
    }

    pub async fn is_channel_member(&self, channel_id: ChannelId, user_id: UserId) -> bool {
        self.membership.read().await.is_member(channel_id, user_id)
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.membership.read().await.client(user_id).is_some()
    }

    pub async fn snapshot(&self) -> MembershipSnapshot {
        self.membership.read().await.snapshot()
    }

    pub async fn chat_typing(&self, key: &ChatRoomKey) -> Vec<UserId> {
        self.membership.read().await.chat_typing(key)
    }

    pub async fn is_consistent(&self) -> bool {
        self.membership.read().await.is_consistent()
    }
}

fn serialize(envelope: &Envelope) -> Option<Outbound> {
    match encode(envelope) {
        Ok(frame) => Some(Arc::from(frame)),
        Err(e) => {
            error!(kind = %envelope.kind, error = %e, "failed to encode outbound frame");
            None
        }
    }
}

fn deliver_soft(connection: &Connection, frame: &Outbound, kind: &MessageType) -> bool {
    match connection.try_deliver(Arc::clone(frame)) {
        Delivery::Delivered => true,
        outcome => {
            debug!(
                user_id = %connection.user_id(),
                %kind,
                ?outcome,
                drops = connection.drop_count(),
                "dropped best-effort frame"
            );
            false
        }
    }
}

//! Router/Dispatcher
//!
//! Maps each inbound command kind to a hub operation. The envelope's
//! `sender_id`, `user_id`, `username` and `pfp_path` have already been
//! overwritten with the connection's authenticated identity by the pump.

use std::sync::Arc;

use agora_shared::time::to_rfc3339;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::domain::{ChannelId, ChatRoomKey, NewChannelMessage, NewDirectMessage, UserId};
use crate::infrastructure::dto::websocket::{Envelope, MessageType};

use super::hub::Hub;

/// Placeholder id of a channel message broadcast before it is persisted.
pub const PROVISIONAL_MESSAGE_ID: &str = "temp";

impl Hub {
    /// Route one command.
    pub async fn dispatch(self: &Arc<Self>, envelope: Envelope) {
        match envelope.kind {
            MessageType::JoinChannel => self.on_join_channel(envelope).await,
            MessageType::LeaveChannel => self.on_leave_channel(envelope).await,
            MessageType::SendChannelMessage => self.on_send_channel_message(envelope).await,
            MessageType::NewMessage => self.broadcast_to_channel(envelope).await,
            MessageType::GetChannelMessages => {
                let hub = Arc::clone(self);
                let _ = tokio::spawn(async move { hub.reply_history(envelope).await });
            }
            MessageType::UserTyping => self.on_channel_typing(envelope).await,
            MessageType::SendMessage | MessageType::ChatMessage => {
                self.on_direct_message(envelope).await
            }
            MessageType::TypingStart | MessageType::TypingStop => {
                self.on_direct_typing(envelope).await
            }
            MessageType::JoinChatRoom | MessageType::LeaveChatRoom => {
                let joined = envelope.kind == MessageType::JoinChatRoom;
                let key = chat_room_key(&envelope);
                debug!(user_id = %envelope.sender_id, room = %key, joined, "chat room update");
                self.update_chat_room(key, envelope.sender_id, joined).await;
            }
            MessageType::ChannelHistory
            | MessageType::NewChatMessage
            | MessageType::UserJoined
            | MessageType::UserLeft
            | MessageType::UserOnline
            | MessageType::UserOffline => {
                debug!(kind = %envelope.kind, user_id = %envelope.sender_id, "server-only kind ignored");
            }
            MessageType::Other(ref kind) => {
                warn!(kind = %kind, user_id = %envelope.sender_id, "unknown message type ignored");
            }
        }
    }

    /// Access check bounded by `access_check_timeout`. Errors and timeouts deny.
    async fn check_access(&self, user_id: UserId, channel_id: ChannelId) -> bool {
        if !self.config().verify_channel_access {
            return true;
        }
        let check = self.access().has_access(user_id, channel_id);
        match timeout(self.config().access_check_timeout(), check).await {
            Ok(Ok(allowed)) => allowed,
            Ok(Err(e)) => {
                warn!(%user_id, %channel_id, error = %e, "access check failed");
                false
            }
            Err(_) => {
                warn!(%user_id, %channel_id, "access check timed out");
                false
            }
        }
    }

    async fn on_join_channel(self: &Arc<Self>, envelope: Envelope) {
        let (user_id, channel_id) = (envelope.sender_id, envelope.channel_id);
        if !channel_id.is_joinable() {
            warn!(%user_id, %channel_id, "join with invalid channel id ignored");
            return;
        }
        if !self.check_access(user_id, channel_id).await {
            info!(%user_id, %channel_id, "channel access denied");
            return;
        }
        if !self.join_channel(channel_id, user_id).await {
            return;
        }
        info!(%user_id, username = %envelope.username, %channel_id, "user joined channel");

        let notice = self.member_notice(MessageType::UserJoined, &envelope);
        self.broadcast_to_channel(notice).await;
    }

    async fn on_leave_channel(self: &Arc<Self>, envelope: Envelope) {
        let (user_id, channel_id) = (envelope.sender_id, envelope.channel_id);
        self.leave_channel(channel_id, user_id).await;
        info!(%user_id, %channel_id, "user left channel");

        let notice = self.member_notice(MessageType::UserLeft, &envelope);
        self.broadcast_to_channel(notice).await;
    }

    fn member_notice(&self, kind: MessageType, envelope: &Envelope) -> Envelope {
        let mut notice = Envelope::new(kind, self.now());
        notice.channel_id = envelope.channel_id;
        notice.user_id = envelope.sender_id;
        notice.username = envelope.username.clone();
        notice.pfp_path = envelope.pfp_path.clone();
        notice
    }

    /// Broadcast first with a provisional id, then persist in the background.
    async fn on_send_channel_message(self: &Arc<Self>, envelope: Envelope) {
        if !envelope.channel_id.is_joinable() {
            warn!(user_id = %envelope.sender_id, channel_id = %envelope.channel_id, "message with invalid channel id ignored");
            return;
        }
        let now = self.now();
        let mut message = Envelope::new(MessageType::NewMessage, now);
        message.channel_id = envelope.channel_id;
        message.user_id = envelope.sender_id;
        message.sender_id = envelope.sender_id;
        message.username = envelope.username.clone();
        message.pfp_path = envelope.pfp_path.clone();
        message.content = envelope.content.clone();
        message.message_id = PROVISIONAL_MESSAGE_ID.to_string();
        message.created_at = to_rfc3339(now);
        self.broadcast_to_channel(message).await;

        let record = NewChannelMessage {
            channel_id: envelope.channel_id,
            user_id: envelope.sender_id,
            content: envelope.content,
            message_type: "text".to_string(),
            created_at: now,
        };
        let hub = Arc::clone(self);
        let _ = tokio::spawn(async move {
            let channel_id = record.channel_id;
            match hub.store().insert_channel_message(record).await {
                Ok(message_id) => info!(%channel_id, %message_id, "channel message saved"),
                Err(e) => warn!(%channel_id, error = %e, "failed to save channel message"),
            }
        });
    }

    async fn reply_history(&self, envelope: Envelope) {
        let (user_id, channel_id) = (envelope.sender_id, envelope.channel_id);
        if !self.check_access(user_id, channel_id).await {
            info!(%user_id, %channel_id, "history request denied");
            return;
        }
        let limit = self.config().history_limit;
        let messages = match self.store().fetch_recent_messages(channel_id, limit).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(%channel_id, error = %e, "failed to load channel history");
                return;
            }
        };
        debug!(%user_id, %channel_id, count = messages.len(), "sending channel history");

        let mut reply = Envelope::new(MessageType::ChannelHistory, self.now());
        reply.channel_id = channel_id;
        reply.data = Some(json!({ "channel_id": channel_id, "messages": messages }));
        let _ = self.send_to_user(user_id, &reply).await;
    }

    async fn on_channel_typing(&self, envelope: Envelope) {
        if !self
            .is_channel_member(envelope.channel_id, envelope.sender_id)
            .await
        {
            debug!(
                user_id = %envelope.sender_id,
                channel_id = %envelope.channel_id,
                "typing from non-member ignored"
            );
            return;
        }
        if let Some(typing) = envelope.typing_flag() {
            self.set_channel_typing(envelope.channel_id, envelope.sender_id, typing)
                .await;
        }
        self.broadcast_to_channel_soft(&envelope).await;
    }

    /// Persist in the background, deliver to the receiver if connected and
    /// echo to the sender.
    async fn on_direct_message(&self, envelope: Envelope) {
        let (sender_id, receiver_id) = (envelope.sender_id, envelope.receiver_id);
        if receiver_id.is_unset() {
            warn!(%sender_id, "direct message without receiver ignored");
            return;
        }
        let now = self.now();
        let record = NewDirectMessage {
            sender_id,
            receiver_id,
            content: envelope.content.clone(),
            created_at: now,
        };
        let store = Arc::clone(self.store());
        let _ = tokio::spawn(async move {
            match store.insert_direct_message(record).await {
                Ok(message_id) => debug!(%sender_id, %receiver_id, %message_id, "direct message saved"),
                Err(e) => warn!(%sender_id, %receiver_id, error = %e, "failed to save direct message"),
            }
        });

        let mut message = Envelope::new(MessageType::NewChatMessage, now);
        message.chat_room = chat_room_key(&envelope).as_str().to_string();
        message.sender_id = sender_id;
        message.receiver_id = receiver_id;
        message.user_id = sender_id;
        message.username = envelope.username.clone();
        message.pfp_path = envelope.pfp_path.clone();
        message.content = envelope.content;
        message.created_at = to_rfc3339(now);

        let delivered = receiver_id != sender_id && self.send_to_user(receiver_id, &message).await;
        let echoed = self.send_to_user(sender_id, &message).await;
        debug!(%sender_id, %receiver_id, delivered, echoed, "direct message routed");
    }

    async fn on_direct_typing(&self, envelope: Envelope) {
        let (sender_id, receiver_id) = (envelope.sender_id, envelope.receiver_id);
        let typing = envelope.kind == MessageType::TypingStart;
        self.set_chat_typing(&chat_room_key(&envelope), sender_id, typing)
            .await;
        if receiver_id.is_unset() || receiver_id == sender_id {
            return;
        }
        let _ = self.send_to_user(receiver_id, &envelope).await;
    }
}

fn chat_room_key(envelope: &Envelope) -> ChatRoomKey {
    ChatRoomKey::resolve(&envelope.chat_room, envelope.sender_id, envelope.receiver_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value;

    use crate::config::HubConfig;
    use crate::domain::{
        AccessChecker, Connection, Identity, MessageStore, MockAccessChecker, OutboundReceiver,
        StoreError,
    };
    use crate::infrastructure::repository::InMemoryStore;
    use agora_shared::time::FixedClock;

    struct Fixture {
        hub: Arc<Hub>,
        store: Arc<InMemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            Self::with_access(store.clone(), store)
        }

        fn with_access(store: Arc<InMemoryStore>, access: Arc<dyn AccessChecker>) -> Self {
            let config = HubConfig {
                access_check_timeout_ms: 50,
                ..HubConfig::default()
            };
            let hub = Arc::new(Hub::new(
                config,
                store.clone(),
                access,
                Arc::new(FixedClock::from_millis(1_700_000_000_000)),
            ));
            Self { hub, store }
        }

        async fn connect(&self, user: i64) -> OutboundReceiver {
            let (conn, mut rx) = Connection::new(
                Identity::new(UserId::new(user), format!("user{}", user), format!("/pfp/{}.png", user)),
                16,
                Utc::now(),
            );
            self.hub.register(conn).await;
            drain(&mut rx);
            rx
        }

        async fn join(&self, user: i64, channel: i64) {
            self.store
                .grant_access(UserId::new(user), ChannelId::new(channel))
                .await;
            let mut join = command(MessageType::JoinChannel, user);
            join.channel_id = ChannelId::new(channel);
            self.hub.dispatch(join).await;
        }
    }

    fn command(kind: MessageType, from: i64) -> Envelope {
        let mut envelope = Envelope::new(kind, Utc::now());
        envelope.sender_id = UserId::new(from);
        envelope.user_id = UserId::new(from);
        envelope.username = format!("user{}", from);
        envelope.pfp_path = format!("/pfp/{}.png", from);
        envelope
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    async fn eventually<F, Fut>(mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_join_notifies_existing_members_only() {
        // テスト項目: 参加時に既存メンバーへ user_joined が届き、本人には届かない
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let mut rx_b = fx.connect(2).await;
        fx.join(1, 5).await;
        drain(&mut rx_a);

        // when (操作):
        fx.join(2, 5).await;

        // then (期待する結果):
        let received = drain(&mut rx_a);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["type"], "user_joined");
        assert_eq!(received[0]["user_id"], 2);
        assert_eq!(received[0]["channel_id"], 5);
        assert!(drain(&mut rx_b).is_empty());
        assert!(fx.hub.is_consistent().await);
    }

    #[tokio::test]
    async fn test_join_without_access_is_silently_refused() {
        // テスト項目: アクセス権の無い参加要求は何も通知せずに拒否される
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let mut rx_b = fx.connect(2).await;
        fx.join(1, 5).await;
        drain(&mut rx_a);
        let mut join = command(MessageType::JoinChannel, 2);
        join.channel_id = ChannelId::new(5);

        // when (操作):
        fx.hub.dispatch(join).await;

        // then (期待する結果):
        assert_eq!(fx.hub.snapshot().await.channels[&ChannelId::new(5)], vec![UserId::new(1)]);
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_join_refused_when_access_check_errors() {
        // テスト項目: アクセス確認が失敗した場合は参加を拒否する
        // given (前提条件):
        let mut access = MockAccessChecker::new();
        access
            .expect_has_access()
            .times(1)
            .returning(|_, _| Err(StoreError::Unavailable("db down".to_string())));
        let fx = Fixture::with_access(Arc::new(InMemoryStore::new()), Arc::new(access));
        let _rx = fx.connect(1).await;
        let mut join = command(MessageType::JoinChannel, 1);
        join.channel_id = ChannelId::new(5);

        // when (操作):
        fx.hub.dispatch(join).await;

        // then (期待する結果):
        assert!(fx.hub.snapshot().await.channels.is_empty());
    }

    struct SlowAccess;

    #[async_trait]
    impl AccessChecker for SlowAccess {
        async fn has_access(&self, _: UserId, _: ChannelId) -> Result<bool, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_join_refused_when_access_check_times_out() {
        // テスト項目: アクセス確認がタイムアウトした場合は参加を拒否する
        // given (前提条件):
        let fx = Fixture::with_access(Arc::new(InMemoryStore::new()), Arc::new(SlowAccess));
        let _rx = fx.connect(1).await;
        let mut join = command(MessageType::JoinChannel, 1);
        join.channel_id = ChannelId::new(5);

        // when (操作):
        fx.hub.dispatch(join).await;

        // then (期待する結果):
        assert!(fx.hub.snapshot().await.channels.is_empty());
    }

    #[tokio::test]
    async fn test_join_requires_positive_channel_id() {
        // テスト項目: channel_id が 0 以下の参加要求は無視される
        // given (前提条件):
        let fx = Fixture::new();
        let _rx = fx.connect(1).await;

        // when (操作):
        fx.join(1, 0).await;

        // then (期待する結果):
        assert!(fx.hub.snapshot().await.channels.is_empty());
    }

    #[tokio::test]
    async fn test_channel_message_broadcast_then_persisted() {
        // テスト項目: チャンネルメッセージは仮 ID で他メンバーへ配信され、その後保存される
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let mut rx_b = fx.connect(2).await;
        fx.join(1, 5).await;
        fx.join(2, 5).await;
        drain(&mut rx_a);
        drain(&mut rx_b);
        let mut send = command(MessageType::SendChannelMessage, 1);
        send.channel_id = ChannelId::new(5);
        send.content = "hi".to_string();

        // when (操作):
        fx.hub.dispatch(send).await;

        // then (期待する結果):
        let received = drain(&mut rx_b);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["type"], "new_message");
        assert_eq!(received[0]["content"], "hi");
        assert_eq!(received[0]["message_id"], "temp");
        assert_eq!(received[0]["user_id"], 1);
        assert_eq!(received[0]["username"], "user1");
        assert_eq!(received[0]["created_at"], "2023-11-14T22:13:20.000000Z");
        assert!(drain(&mut rx_a).is_empty());
        let store = fx.store.clone();
        assert!(eventually(|| { let s = store.clone(); async move { s.channel_message_count().await == 1 } }).await);
    }

    #[tokio::test]
    async fn test_history_reply_goes_to_requester_only() {
        // テスト項目: 履歴は要求者だけに古い順で返される
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let mut rx_b = fx.connect(2).await;
        fx.join(1, 5).await;
        fx.join(2, 5).await;
        let base = Utc::now();
        for (i, text) in ["first", "second"].iter().enumerate() {
            fx.store
                .insert_channel_message(NewChannelMessage {
                    channel_id: ChannelId::new(5),
                    user_id: UserId::new(2),
                    content: text.to_string(),
                    message_type: "text".to_string(),
                    created_at: base + chrono::Duration::seconds(i as i64),
                })
                .await
                .unwrap();
        }
        drain(&mut rx_a);
        drain(&mut rx_b);
        let mut fetch = command(MessageType::GetChannelMessages, 1);
        fetch.channel_id = ChannelId::new(5);

        // when (操作):
        fx.hub.dispatch(fetch).await;

        // then (期待する結果):
        let mut history = Vec::new();
        assert!(eventually(|| {
            history.extend(drain(&mut rx_a));
            let done = !history.is_empty();
            async move { done }
        })
        .await);
        assert_eq!(history[0]["type"], "messages_history");
        assert_eq!(history[0]["data"]["channel_id"], 5);
        let messages = history[0]["data"]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["content"], "first");
        assert_eq!(messages[1]["content"], "second");
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_history_denied_is_silent() {
        // テスト項目: アクセス権が無い履歴要求には何も返さない
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let mut fetch = command(MessageType::GetChannelMessages, 1);
        fetch.channel_id = ChannelId::new(9);

        // when (操作):
        fx.hub.dispatch(fetch).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // then (期待する結果):
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn test_channel_typing_updates_state_and_skips_sender() {
        // テスト項目: タイピング状態が更新され、送信者以外にそのまま転送される
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let mut rx_b = fx.connect(2).await;
        fx.join(1, 5).await;
        fx.join(2, 5).await;
        drain(&mut rx_a);
        drain(&mut rx_b);
        let mut typing = command(MessageType::UserTyping, 1);
        typing.channel_id = ChannelId::new(5);
        typing.data = Some(json!({"typing": true}));

        // when (操作):
        fx.hub.dispatch(typing).await;

        // then (期待する結果):
        assert_eq!(
            fx.hub.snapshot().await.channel_typing[&ChannelId::new(5)],
            vec![UserId::new(1)]
        );
        let received = drain(&mut rx_b);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["type"], "user_typing");
        assert_eq!(received[0]["data"]["typing"], true);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn test_typing_for_unjoined_channel_is_ignored() {
        // テスト項目: 参加していないチャンネルへのタイピングは記録も転送もされず、切断後に何も残らない
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let mut rx_b = fx.connect(2).await;
        fx.join(2, 5).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        // when (操作):
        for channel in 1..=1000 {
            let mut typing = command(MessageType::UserTyping, 1);
            typing.channel_id = ChannelId::new(channel);
            typing.data = Some(json!({"typing": true}));
            fx.hub.dispatch(typing).await;
        }
        let before_disconnect = fx.hub.snapshot().await;
        let alice = fx.hub.membership.read().await.client(UserId::new(1)).cloned();
        if let Some(alice) = alice {
            fx.hub.unregister(&alice).await;
        }

        // then (期待する結果):
        assert!(before_disconnect.channel_typing.is_empty());
        assert!(fx.hub.snapshot().await.channel_typing.is_empty());
        let received = drain(&mut rx_b);
        assert!(received.iter().all(|frame| frame["type"] != "user_typing"));
    }

    #[tokio::test]
    async fn test_leave_clears_typing_and_notifies() {
        // テスト項目: 退出でタイピング状態が消え、残りのメンバーに user_left が届く
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let _rx_b = fx.connect(2).await;
        fx.join(1, 5).await;
        fx.join(2, 5).await;
        fx.hub.set_channel_typing(ChannelId::new(5), UserId::new(2), true).await;
        drain(&mut rx_a);
        let mut leave = command(MessageType::LeaveChannel, 2);
        leave.channel_id = ChannelId::new(5);

        // when (操作):
        fx.hub.dispatch(leave).await;

        // then (期待する結果):
        let snapshot = fx.hub.snapshot().await;
        assert!(snapshot.channel_typing.is_empty());
        assert_eq!(snapshot.channels[&ChannelId::new(5)], vec![UserId::new(1)]);
        let received = drain(&mut rx_a);
        assert_eq!(received[0]["type"], "user_left");
        assert_eq!(received[0]["user_id"], 2);
    }

    #[tokio::test]
    async fn test_direct_message_to_offline_user_still_echoes() {
        // テスト項目: オフラインの相手へのダイレクトメッセージでも送信者にはエコーが返る
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let mut dm = command(MessageType::ChatMessage, 1);
        dm.receiver_id = UserId::new(2);
        dm.content = "are you there".to_string();

        // when (操作):
        fx.hub.dispatch(dm).await;

        // then (期待する結果):
        let received = drain(&mut rx_a);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["type"], "new_chat_message");
        assert_eq!(received[0]["content"], "are you there");
        assert_eq!(received[0]["receiver_id"], 2);
        assert_eq!(received[0]["chat_room"], "user_1_user_2");
        let store = fx.store.clone();
        assert!(eventually(|| { let s = store.clone(); async move { s.direct_messages().await.len() == 1 } }).await);
    }

    #[tokio::test]
    async fn test_direct_message_reaches_receiver_and_nobody_else() {
        // テスト項目: ダイレクトメッセージは受信者と送信者にだけ届く
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let mut rx_b = fx.connect(2).await;
        let mut rx_c = fx.connect(3).await;
        drain(&mut rx_a);
        drain(&mut rx_b);
        let mut dm = command(MessageType::SendMessage, 1);
        dm.receiver_id = UserId::new(2);
        dm.content = "psst".to_string();

        // when (操作):
        fx.hub.dispatch(dm).await;

        // then (期待する結果):
        assert_eq!(drain(&mut rx_a).len(), 1);
        let received = drain(&mut rx_b);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["sender_id"], 1);
        assert!(drain(&mut rx_c).is_empty());
    }

    #[tokio::test]
    async fn test_direct_typing_forwarded_to_receiver_only() {
        // テスト項目: 1 対 1 のタイピング通知は受信者だけに転送され、状態が更新される
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let mut rx_b = fx.connect(2).await;
        drain(&mut rx_a);
        let mut start = command(MessageType::TypingStart, 1);
        start.receiver_id = UserId::new(2);

        // when (操作):
        fx.hub.dispatch(start).await;

        // then (期待する結果):
        let room = ChatRoomKey::for_pair(UserId::new(1), UserId::new(2));
        assert_eq!(fx.hub.chat_typing(&room).await, vec![UserId::new(1)]);
        let received = drain(&mut rx_b);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["type"], "typing_start");
        assert!(drain(&mut rx_a).is_empty());

        let mut stop = command(MessageType::TypingStop, 1);
        stop.receiver_id = UserId::new(2);
        fx.hub.dispatch(stop).await;
        assert!(fx.hub.chat_typing(&room).await.is_empty());
    }

    #[tokio::test]
    async fn test_chat_room_join_and_leave() {
        // テスト項目: チャットルームへの参加・退出が接続に記録され、退出でタイピング状態も消える
        // given (前提条件):
        let fx = Fixture::new();
        let (conn, _rx) = Connection::new(Identity::new(UserId::new(1), "user1", ""), 8, Utc::now());
        fx.hub.register(Arc::clone(&conn)).await;
        let room = ChatRoomKey::for_pair(UserId::new(1), UserId::new(2));
        let mut join = command(MessageType::JoinChatRoom, 1);
        join.receiver_id = UserId::new(2);

        // when (操作):
        fx.hub.dispatch(join).await;
        fx.hub.set_chat_typing(&room, UserId::new(1), true).await;

        // then (期待する結果):
        assert_eq!(conn.chat_rooms(), vec![room.clone()]);
        let mut leave = command(MessageType::LeaveChatRoom, 1);
        leave.chat_room = room.as_str().to_string();
        fx.hub.dispatch(leave).await;
        assert!(conn.chat_rooms().is_empty());
        assert!(fx.hub.chat_typing(&room).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_and_server_kinds_are_ignored() {
        // テスト項目: 未知の種別とサーバー専用の種別は無視される
        // given (前提条件):
        let fx = Fixture::new();
        let mut rx_a = fx.connect(1).await;
        let mut rx_b = fx.connect(2).await;
        drain(&mut rx_a);

        // when (操作):
        fx.hub.dispatch(command(MessageType::Other("dance".to_string()), 2)).await;
        fx.hub.dispatch(command(MessageType::UserOnline, 2)).await;

        // then (期待する結果):
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
    }
}

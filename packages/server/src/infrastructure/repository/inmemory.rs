//! InMemory collaborator 実装
//!
//! ドメイン層が定義する `MessageStore` / `AccessChecker` trait の
//! インメモリ実装。データベースが設定されていない場合とテストで使用します。
//!
//! 再起動するとメッセージ履歴は失われます。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    AccessChecker, ChannelId, MessageId, MessageStore, NewChannelMessage, NewDirectMessage,
    PersistedMessage, StoreError, UserDisplay, UserId,
};

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, UserDisplay>,
    access: HashSet<(UserId, ChannelId)>,
    channel_messages: Vec<PersistedMessage>,
    direct_messages: Vec<(MessageId, NewDirectMessage)>,
    last_id: i64,
}

impl StoreState {
    fn next_id(&mut self) -> MessageId {
        self.last_id += 1;
        MessageId::new(self.last_id)
    }
}

/// インメモリ collaborator 実装
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    /// 新しい空の InMemoryStore を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// ユーザーの表示情報を登録（既存の場合は上書き）
    pub async fn add_user(&self, user_id: UserId, username: &str, pfp_path: &str) {
        let mut state = self.state.lock().await;
        let _ = state.users.insert(
            user_id,
            UserDisplay {
                username: username.to_string(),
                pfp_path: pfp_path.to_string(),
            },
        );
    }

    /// チャンネルへのアクセス権を付与
    pub async fn grant_access(&self, user_id: UserId, channel_id: ChannelId) {
        let mut state = self.state.lock().await;
        let _ = state.access.insert((user_id, channel_id));
    }

    /// チャンネルへのアクセス権を剥奪
    pub async fn revoke_access(&self, user_id: UserId, channel_id: ChannelId) {
        let mut state = self.state.lock().await;
        let _ = state.access.remove(&(user_id, channel_id));
    }

    /// メッセージを論理削除。存在しない場合は false
    pub async fn soft_delete(&self, message_id: MessageId) -> bool {
        let mut state = self.state.lock().await;
        match state
            .channel_messages
            .iter_mut()
            .find(|m| m.message_id == message_id)
        {
            Some(message) => {
                message.is_deleted = true;
                true
            }
            None => false,
        }
    }

    /// 保存済みのチャンネルメッセージ数（論理削除を含む）
    pub async fn channel_message_count(&self) -> usize {
        self.state.lock().await.channel_messages.len()
    }

    /// 保存済みのダイレクトメッセージ
    pub async fn direct_messages(&self) -> Vec<NewDirectMessage> {
        let state = self.state.lock().await;
        state
            .direct_messages
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn insert_channel_message(
        &self,
        message: NewChannelMessage,
    ) -> Result<MessageId, StoreError> {
        let mut state = self.state.lock().await;
        let message_id = state.next_id();
        let display = state
            .users
            .get(&message.user_id)
            .cloned()
            .unwrap_or_else(UserDisplay::unknown);
        state.channel_messages.push(PersistedMessage {
            message_id,
            channel_id: message.channel_id,
            user_id: message.user_id,
            content: message.content,
            message_type: message.message_type,
            reply_to_message_id: None,
            is_edited: false,
            is_deleted: false,
            created_at: message.created_at,
            updated_at: None,
            username: display.username,
            firstname: String::new(),
            lastname: String::new(),
            pfp_path: display.pfp_path,
        });
        Ok(message_id)
    }

    async fn insert_direct_message(
        &self,
        message: NewDirectMessage,
    ) -> Result<MessageId, StoreError> {
        let mut state = self.state.lock().await;
        let message_id = state.next_id();
        state.direct_messages.push((message_id, message));
        Ok(message_id)
    }

    async fn fetch_recent_messages(
        &self,
        channel_id: ChannelId,
        limit: usize,
    ) -> Result<Vec<PersistedMessage>, StoreError> {
        let state = self.state.lock().await;
        let mut messages: Vec<PersistedMessage> = state
            .channel_messages
            .iter()
            .filter(|m| m.channel_id == channel_id && !m.is_deleted)
            .cloned()
            .collect();
        messages.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.message_id.cmp(&b.message_id))
        });
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    async fn fetch_user_display(&self, user_id: UserId) -> Result<UserDisplay, StoreError> {
        let state = self.state.lock().await;
        state
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
    }
}

#[async_trait]
impl AccessChecker for InMemoryStore {
    async fn has_access(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.access.contains(&(user_id, channel_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn channel_message(channel: i64, user: i64, content: &str, at: DateTime<Utc>) -> NewChannelMessage {
        NewChannelMessage {
            channel_id: ChannelId::new(channel),
            user_id: UserId::new(user),
            content: content.to_string(),
            message_type: "text".to_string(),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_fetch_recent_messages_returns_newest_oldest_first() {
        // テスト項目: 最新 N 件が古い順で返される
        // given (前提条件):
        let store = InMemoryStore::new();
        let base = Utc::now();
        for i in 0..5 {
            store
                .insert_channel_message(channel_message(1, 1, &format!("m{}", i), base + Duration::seconds(i)))
                .await
                .unwrap();
        }

        // when (操作):
        let messages = store.fetch_recent_messages(ChannelId::new(1), 3).await.unwrap();

        // then (期待する結果):
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_fetch_recent_messages_excludes_deleted_and_other_channels() {
        // テスト項目: 論理削除済みと他チャンネルのメッセージは含まれない
        // given (前提条件):
        let store = InMemoryStore::new();
        let now = Utc::now();
        let keep = store.insert_channel_message(channel_message(1, 1, "keep", now)).await.unwrap();
        let gone = store.insert_channel_message(channel_message(1, 1, "gone", now)).await.unwrap();
        store.insert_channel_message(channel_message(2, 1, "other", now)).await.unwrap();

        // when (操作):
        assert!(store.soft_delete(gone).await);
        let messages = store.fetch_recent_messages(ChannelId::new(1), 50).await.unwrap();

        // then (期待する結果):
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, keep);
        assert_eq!(store.channel_message_count().await, 3);
    }

    #[tokio::test]
    async fn test_insert_denormalizes_sender_display() {
        // テスト項目: 登録済みユーザーの表示情報が付与され、未登録なら Unknown になる
        // given (前提条件):
        let store = InMemoryStore::new();
        store.add_user(UserId::new(1), "alice", "/pfp/a.png").await;
        let now = Utc::now();

        // when (操作):
        store.insert_channel_message(channel_message(1, 1, "hi", now)).await.unwrap();
        store.insert_channel_message(channel_message(1, 9, "who", now)).await.unwrap();
        let messages = store.fetch_recent_messages(ChannelId::new(1), 50).await.unwrap();

        // then (期待する結果):
        assert_eq!(messages[0].username, "alice");
        assert_eq!(messages[0].pfp_path, "/pfp/a.png");
        assert_eq!(messages[1].username, "Unknown");
    }

    #[tokio::test]
    async fn test_access_grant_and_revoke() {
        // テスト項目: アクセス権の付与・剥奪が has_access に反映される
        // given (前提条件):
        let store = InMemoryStore::new();
        let (user, channel) = (UserId::new(1), ChannelId::new(5));

        // when (操作) / then (期待する結果):
        assert!(!store.has_access(user, channel).await.unwrap());
        store.grant_access(user, channel).await;
        assert!(store.has_access(user, channel).await.unwrap());
        store.revoke_access(user, channel).await;
        assert!(!store.has_access(user, channel).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_user_display_not_found() {
        // テスト項目: 未登録ユーザーの表示情報取得は NotFound になる
        // given (前提条件):
        let store = InMemoryStore::new();

        // when (操作):
        let result = store.fetch_user_display(UserId::new(42)).await;

        // then (期待する結果):
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_direct_messages_are_recorded() {
        // テスト項目: ダイレクトメッセージが保存され、ID が採番される
        // given (前提条件):
        let store = InMemoryStore::new();
        let message = NewDirectMessage {
            sender_id: UserId::new(1),
            receiver_id: UserId::new(2),
            content: "psst".to_string(),
            created_at: Utc::now(),
        };

        // when (操作):
        let first = store.insert_direct_message(message.clone()).await.unwrap();
        let second = store.insert_direct_message(message.clone()).await.unwrap();

        // then (期待する結果):
        assert!(second > first);
        assert_eq!(store.direct_messages().await, vec![message.clone(), message]);
    }
}

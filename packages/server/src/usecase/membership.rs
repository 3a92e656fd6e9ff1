//! Membership Store
//!
//! 接続中クライアント・チャンネル参加者・タイピング状態を保持するインメモリの表。
//! Hub の RwLock の内側でのみ操作され、生のマップは外部に公開しません。
//!
//! 不変条件: `channels[k]` に接続 c が含まれる ⇔ `c.channel_ids()` に k が含まれる

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::domain::{ChannelId, ChatRoomKey, Connection, UserId};

/// 観測用のスナップショット
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipSnapshot {
    pub clients: Vec<UserId>,
    pub channels: BTreeMap<ChannelId, Vec<UserId>>,
    pub channel_typing: BTreeMap<ChannelId, Vec<UserId>>,
}

/// Membership Store
#[derive(Default)]
pub struct Membership {
    clients: HashMap<UserId, Arc<Connection>>,
    channels: HashMap<ChannelId, HashMap<UserId, Arc<Connection>>>,
    channel_typing: HashMap<ChannelId, HashSet<UserId>>,
    chat_typing: HashMap<ChatRoomKey, HashSet<UserId>>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// クライアント表に登録する。同じユーザーの別の接続が登録済みならそれを返す
    pub fn insert_client(&mut self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let previous = self.clients.insert(connection.user_id(), Arc::clone(&connection))?;
        (previous.id() != connection.id()).then_some(previous)
    }

    pub fn client(&self, user_id: UserId) -> Option<&Arc<Connection>> {
        self.clients.get(&user_id)
    }

    pub fn clients(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.clients.values()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// チャンネルの参加者
    pub fn members(&self, channel_id: ChannelId) -> impl Iterator<Item = &Arc<Connection>> {
        self.channels
            .get(&channel_id)
            .into_iter()
            .flat_map(|members| members.values())
    }

    pub fn is_member(&self, channel_id: ChannelId, user_id: UserId) -> bool {
        self.channels
            .get(&channel_id)
            .is_some_and(|members| members.contains_key(&user_id))
    }

    pub fn member_count(&self, channel_id: ChannelId) -> usize {
        self.channels.get(&channel_id).map_or(0, HashMap::len)
    }

    /// チャンネルに参加させる。新規参加なら true
    ///
    /// 同じユーザーの別の接続が参加済みの場合は置き換え、古い接続側の
    /// チャンネル集合からも取り除く。
    pub fn join(&mut self, channel_id: ChannelId, connection: &Arc<Connection>) -> bool {
        let members = self.channels.entry(channel_id).or_default();
        let replaced = members.insert(connection.user_id(), Arc::clone(connection));
        connection.add_channel(channel_id);
        match replaced {
            Some(previous) if previous.id() != connection.id() => {
                let _ = previous.remove_channel(channel_id);
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// ユーザーをチャンネルから外し、そのチャンネルでのタイピング状態も消す
    pub fn leave(&mut self, channel_id: ChannelId, user_id: UserId) -> Option<Arc<Connection>> {
        let removed = self.remove_member(channel_id, user_id, None);
        self.clear_channel_typing(channel_id, user_id);
        removed
    }

    /// 接続をすべてのチャンネルとクライアント表から取り除き、外れたチャンネルを返す
    ///
    /// 表のエントリが別の接続（再接続後の新しい接続）に置き換わっている場合、
    /// そのエントリには触れない。
    pub fn remove_connection(&mut self, connection: &Connection) -> Vec<ChannelId> {
        let user_id = connection.user_id();
        let mut left = Vec::new();
        for channel_id in connection.channel_ids() {
            if self
                .remove_member(channel_id, user_id, Some(connection))
                .is_some()
            {
                self.clear_channel_typing(channel_id, user_id);
                left.push(channel_id);
            } else {
                let _ = connection.remove_channel(channel_id);
            }
        }

        let is_current = self
            .clients
            .get(&user_id)
            .is_some_and(|current| current.id() == connection.id());
        if is_current {
            let _ = self.clients.remove(&user_id);
        }
        if !self.clients.contains_key(&user_id) {
            self.channel_typing.retain(|_, users| {
                let _ = users.remove(&user_id);
                !users.is_empty()
            });
            self.chat_typing.retain(|_, users| {
                let _ = users.remove(&user_id);
                !users.is_empty()
            });
        }
        left
    }

    fn remove_member(
        &mut self,
        channel_id: ChannelId,
        user_id: UserId,
        only: Option<&Connection>,
    ) -> Option<Arc<Connection>> {
        let members = self.channels.get_mut(&channel_id)?;
        let matches = members
            .get(&user_id)
            .is_some_and(|c| only.is_none_or(|only| c.id() == only.id()));
        if !matches {
            return None;
        }
        let removed = members.remove(&user_id);
        if members.is_empty() {
            let _ = self.channels.remove(&channel_id);
        }
        if let Some(connection) = &removed {
            let _ = connection.remove_channel(channel_id);
        }
        removed
    }

    /// Only members can be marked typing; clearing always succeeds.
    pub fn set_channel_typing(&mut self, channel_id: ChannelId, user_id: UserId, typing: bool) {
        if typing {
            if !self.is_member(channel_id, user_id) {
                return;
            }
            let _ = self.channel_typing.entry(channel_id).or_default().insert(user_id);
        } else {
            self.clear_channel_typing(channel_id, user_id);
        }
    }

    fn clear_channel_typing(&mut self, channel_id: ChannelId, user_id: UserId) {
        if let Some(users) = self.channel_typing.get_mut(&channel_id) {
            let _ = users.remove(&user_id);
            if users.is_empty() {
                let _ = self.channel_typing.remove(&channel_id);
            }
        }
    }

    pub fn channel_typing(&self, channel_id: ChannelId) -> Vec<UserId> {
        sorted(self.channel_typing.get(&channel_id))
    }

    pub fn set_chat_typing(&mut self, key: &ChatRoomKey, user_id: UserId, typing: bool) {
        if typing {
            let _ = self.chat_typing.entry(key.clone()).or_default().insert(user_id);
        } else if let Some(users) = self.chat_typing.get_mut(key) {
            let _ = users.remove(&user_id);
            if users.is_empty() {
                let _ = self.chat_typing.remove(key);
            }
        }
    }

    pub fn chat_typing(&self, key: &ChatRoomKey) -> Vec<UserId> {
        sorted(self.chat_typing.get(key))
    }

    pub fn snapshot(&self) -> MembershipSnapshot {
        let mut clients: Vec<UserId> = self.clients.keys().copied().collect();
        clients.sort();
        MembershipSnapshot {
            clients,
            channels: self
                .channels
                .iter()
                .map(|(id, members)| {
                    let mut users: Vec<UserId> = members.keys().copied().collect();
                    users.sort();
                    (*id, users)
                })
                .collect(),
            channel_typing: self
                .channel_typing
                .iter()
                .map(|(id, users)| (*id, sorted(Some(users))))
                .collect(),
        }
    }

    /// 双方向の整合性と空エントリの除去が保たれているか
    pub fn is_consistent(&self) -> bool {
        let forward = self.channels.iter().all(|(channel_id, members)| {
            !members.is_empty()
                && members
                    .iter()
                    .all(|(user_id, c)| c.user_id() == *user_id && c.in_channel(*channel_id))
        });
        let backward = self
            .channels
            .values()
            .flat_map(HashMap::values)
            .chain(self.clients.values())
            .all(|c| {
                c.channel_ids().into_iter().all(|channel_id| {
                    self.channels
                        .get(&channel_id)
                        .and_then(|members| members.get(&c.user_id()))
                        .is_some_and(|member| member.id() == c.id())
                })
            });
        forward && backward
    }
}

fn sorted(users: Option<&HashSet<UserId>>) -> Vec<UserId> {
    let mut users: Vec<UserId> = users.into_iter().flatten().copied().collect();
    users.sort();
    users
}

//! SQLite collaborator implementation.
//!
//! A single `rusqlite::Connection` behind a mutex. Every query runs on the
//! blocking pool so the async runtime never waits on disk I/O.
//!
//! Timestamps are stored as fixed-width RFC3339 text (microseconds, `Z`) so
//! that lexical order equals chronological order.

use std::{path::Path, sync::Arc};

use agora_shared::time::to_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};

use crate::domain::{
    AccessChecker, ChannelId, MessageId, MessageStore, NewChannelMessage, NewDirectMessage,
    PersistedMessage, StoreError, UserDisplay, UserId,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id     INTEGER PRIMARY KEY,
    username    TEXT NOT NULL UNIQUE,
    firstname   TEXT NOT NULL DEFAULT '',
    lastname    TEXT NOT NULL DEFAULT '',
    pfp_path    TEXT
);

CREATE TABLE IF NOT EXISTS communities (
    community_id INTEGER PRIMARY KEY,
    name         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS community_members (
    community_id INTEGER NOT NULL REFERENCES communities(community_id),
    user_id      INTEGER NOT NULL REFERENCES users(user_id),
    status       TEXT NOT NULL DEFAULT 'active',
    PRIMARY KEY (community_id, user_id)
);

CREATE TABLE IF NOT EXISTS channels (
    channel_id   INTEGER PRIMARY KEY,
    community_id INTEGER NOT NULL REFERENCES communities(community_id),
    name         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS channel_messages (
    message_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id          INTEGER NOT NULL,
    user_id             INTEGER NOT NULL,
    content             TEXT NOT NULL,
    message_type        TEXT NOT NULL DEFAULT 'text',
    reply_to_message_id INTEGER,
    is_edited           INTEGER NOT NULL DEFAULT 0,
    is_deleted          INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    updated_at          TEXT
);

CREATE INDEX IF NOT EXISTS idx_channel_messages_channel_created
    ON channel_messages (channel_id, created_at);

CREATE TABLE IF NOT EXISTS messages (
    message_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id   INTEGER NOT NULL,
    receiver_id INTEGER NOT NULL,
    content     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
"#;

const RECENT_MESSAGES_SQL: &str = r#"
SELECT message_id, channel_id, user_id, content, message_type, reply_to_message_id,
       is_edited, is_deleted, created_at, updated_at, username, firstname, lastname, pfp_path
FROM (
    SELECT cm.message_id, cm.channel_id, cm.user_id, cm.content, cm.message_type,
           cm.reply_to_message_id, cm.is_edited, cm.is_deleted, cm.created_at, cm.updated_at,
           COALESCE(u.username, 'Unknown') AS username,
           COALESCE(u.firstname, '') AS firstname,
           COALESCE(u.lastname, '') AS lastname,
           COALESCE(u.pfp_path, '') AS pfp_path
    FROM channel_messages cm
    LEFT JOIN users u ON cm.user_id = u.user_id
    WHERE cm.channel_id = ?1 AND cm.is_deleted = 0
    ORDER BY cm.created_at DESC, cm.message_id DESC
    LIMIT ?2
)
ORDER BY created_at ASC, message_id ASC
"#;

const HAS_ACCESS_SQL: &str = r#"
SELECT EXISTS (
    SELECT 1
    FROM channels c
    JOIN communities co ON c.community_id = co.community_id
    JOIN community_members m ON co.community_id = m.community_id
    WHERE c.channel_id = ?1 AND m.user_id = ?2 AND m.status = 'active'
)
"#;

/// SQLite-backed message store and access checker.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// A private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await?
    }

    /// Insert or update a user row.
    pub async fn upsert_user(
        &self,
        user_id: UserId,
        username: &str,
        firstname: &str,
        lastname: &str,
        pfp_path: Option<&str>,
    ) -> Result<(), StoreError> {
        let (username, firstname, lastname) =
            (username.to_string(), firstname.to_string(), lastname.to_string());
        let pfp_path = pfp_path.map(str::to_string);
        self.run(move |conn| {
            let _ = conn.execute(
                "INSERT INTO users (user_id, username, firstname, lastname, pfp_path)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    username = excluded.username,
                    firstname = excluded.firstname,
                    lastname = excluded.lastname,
                    pfp_path = excluded.pfp_path",
                params![user_id.value(), username, firstname, lastname, pfp_path],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn create_community(&self, community_id: i64, name: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        self.run(move |conn| {
            let _ = conn.execute(
                "INSERT OR IGNORE INTO communities (community_id, name) VALUES (?1, ?2)",
                params![community_id, name],
            )?;
            Ok(())
        })
        .await
    }

    /// Add (or re-status) a community member. Only `active` members have access.
    pub async fn set_member_status(
        &self,
        community_id: i64,
        user_id: UserId,
        status: &str,
    ) -> Result<(), StoreError> {
        let status = status.to_string();
        self.run(move |conn| {
            let _ = conn.execute(
                "INSERT INTO community_members (community_id, user_id, status) VALUES (?1, ?2, ?3)
                 ON CONFLICT(community_id, user_id) DO UPDATE SET status = excluded.status",
                params![community_id, user_id.value(), status],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn create_channel(
        &self,
        channel_id: ChannelId,
        community_id: i64,
        name: &str,
    ) -> Result<(), StoreError> {
        let name = name.to_string();
        self.run(move |conn| {
            let _ = conn.execute(
                "INSERT OR IGNORE INTO channels (channel_id, community_id, name) VALUES (?1, ?2, ?3)",
                params![channel_id.value(), community_id, name],
            )?;
            Ok(())
        })
        .await
    }

    /// Mark a channel message deleted. Returns whether a row was affected.
    pub async fn soft_delete_message(&self, message_id: MessageId) -> Result<bool, StoreError> {
        self.run(move |conn| {
            let now = to_rfc3339(Utc::now());
            let changed = conn.execute(
                "UPDATE channel_messages SET is_deleted = 1, updated_at = ?2 WHERE message_id = ?1",
                params![message_id.value(), now],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Number of stored direct messages.
    pub async fn direct_message_count(&self) -> Result<usize, StoreError> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            usize::try_from(count).map_err(|e| StoreError::InvalidData(e.to_string()))
        })
        .await
    }
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<PersistedMessage> {
    let created_at: String = row.get(8)?;
    let updated_at: Option<String> = row.get(9)?;
    Ok(PersistedMessage {
        message_id: MessageId::new(row.get(0)?),
        channel_id: ChannelId::new(row.get(1)?),
        user_id: UserId::new(row.get(2)?),
        content: row.get(3)?,
        message_type: row.get(4)?,
        reply_to_message_id: row.get::<_, Option<i64>>(5)?.map(MessageId::new),
        is_edited: row.get(6)?,
        is_deleted: row.get(7)?,
        created_at: parse_timestamp(8, &created_at)?,
        updated_at: updated_at
            .as_deref()
            .map(|raw| parse_timestamp(9, raw))
            .transpose()?,
        username: row.get(10)?,
        firstname: row.get(11)?,
        lastname: row.get(12)?,
        pfp_path: row.get(13)?,
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_channel_message(
        &self,
        message: NewChannelMessage,
    ) -> Result<MessageId, StoreError> {
        self.run(move |conn| {
            let _ = conn.execute(
                "INSERT INTO channel_messages (channel_id, user_id, content, message_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.channel_id.value(),
                    message.user_id.value(),
                    message.content,
                    message.message_type,
                    to_rfc3339(message.created_at),
                ],
            )?;
            Ok(MessageId::new(conn.last_insert_rowid()))
        })
        .await
    }

    async fn insert_direct_message(
        &self,
        message: NewDirectMessage,
    ) -> Result<MessageId, StoreError> {
        self.run(move |conn| {
            let _ = conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    message.sender_id.value(),
                    message.receiver_id.value(),
                    message.content,
                    to_rfc3339(message.created_at),
                ],
            )?;
            Ok(MessageId::new(conn.last_insert_rowid()))
        })
        .await
    }

    async fn fetch_recent_messages(
        &self,
        channel_id: ChannelId,
        limit: usize,
    ) -> Result<Vec<PersistedMessage>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt = conn.prepare(RECENT_MESSAGES_SQL)?;
            let rows = stmt.query_map(params![channel_id.value(), limit], map_message)?;
            let messages = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }

    async fn fetch_user_display(&self, user_id: UserId) -> Result<UserDisplay, StoreError> {
        self.run(move |conn| {
            conn.query_row(
                "SELECT username, COALESCE(pfp_path, '') FROM users WHERE user_id = ?1",
                params![user_id.value()],
                |row| {
                    Ok(UserDisplay {
                        username: row.get(0)?,
                        pfp_path: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
        })
        .await
    }
}

#[async_trait]
impl AccessChecker for SqliteStore {
    async fn has_access(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool, StoreError> {
        self.run(move |conn| {
            let allowed: bool = conn.query_row(
                HAS_ACCESS_SQL,
                params![channel_id.value(), user_id.value()],
                |row| row.get(0),
            )?;
            Ok(allowed)
        })
        .await
    }
}

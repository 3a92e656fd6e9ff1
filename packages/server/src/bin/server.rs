//! Real-time connection hub server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin agora-server
//! cargo run --bin agora-server -- --host 0.0.0.0 --port 3000 --database agora.db
//! ```

use std::{path::PathBuf, sync::Arc};

use agora_server::{
    config::{DuplicatePolicy, HubConfig},
    domain::{AccessChecker, MessageStore},
    infrastructure::repository::{InMemoryStore, SqliteStore},
    ui::Server,
    usecase::{self, Hub},
};
use agora_shared::{logger::setup_logger, time::SystemClock};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "agora-server")]
#[command(about = "Real-time WebSocket hub for channels and direct chat", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "PORT", default_value = "8080")]
    port: u16,

    /// SQLite database file. Messages are kept in memory when omitted
    #[arg(long, env = "DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Per-connection outbound queue size
    #[arg(long, default_value_t = HubConfig::default().outbound_capacity)]
    outbound_capacity: usize,

    /// Join channels without consulting the access checker
    #[arg(long)]
    skip_access_check: bool,

    /// What to do with the older connection when a user connects twice
    #[arg(long, value_enum, default_value_t = DuplicatePolicy::ClosePrevious)]
    duplicate_policy: DuplicatePolicy,
}

/// The in-memory store starts with no access grants, so checks only make
/// sense against a database.
fn hub_config(args: &Args) -> HubConfig {
    let verify_channel_access = if args.skip_access_check {
        false
    } else if args.database.is_none() {
        tracing::warn!("No database configured, channel access checks are disabled");
        false
    } else {
        true
    };
    HubConfig {
        outbound_capacity: args.outbound_capacity,
        verify_channel_access,
        duplicate_policy: args.duplicate_policy,
        ..HubConfig::default()
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(&["agora-server", "agora-shared"], env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    // 1. Collaborators
    let (store, access): (Arc<dyn MessageStore>, Arc<dyn AccessChecker>) = match &args.database {
        Some(path) => match SqliteStore::open(path) {
            Ok(sqlite) => {
                tracing::info!("Using SQLite database at {}", path.display());
                let sqlite = Arc::new(sqlite);
                (sqlite.clone(), sqlite)
            }
            Err(e) => {
                tracing::error!("Failed to open database {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("No database configured, message history is kept in memory");
            let memory = Arc::new(InMemoryStore::new());
            (memory.clone(), memory)
        }
    };

    // 2. Hub and coordinator
    let config = hub_config(&args);
    tracing::debug!(?config, "hub configuration");
    let hub = Arc::new(Hub::new(config, store, access, Arc::new(SystemClock)));
    let (handle, _coordinator) = usecase::spawn(hub);

    // 3. Server
    let server = Server::new(handle);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_server::{
        domain::{ChannelId, Connection, Identity, UserId},
        infrastructure::dto::websocket::{Envelope, MessageType},
    };
    use chrono::Utc;

    #[test]
    fn test_access_check_disabled_without_database() {
        // テスト項目: データベース未指定ならアクセス確認が無効になる
        // given (前提条件):
        let args = Args::parse_from(["agora-server"]);

        // when (操作):
        let config = hub_config(&args);

        // then (期待する結果):
        assert!(!config.verify_channel_access);
    }

    #[test]
    fn test_access_check_enabled_with_database() {
        // テスト項目: データベース指定時はアクセス確認が有効、明示的なスキップは優先される
        // given (前提条件):
        let with_db = Args::parse_from(["agora-server", "--database", "agora.db"]);
        let skipped =
            Args::parse_from(["agora-server", "--database", "agora.db", "--skip-access-check"]);

        // when (操作):
        let enabled = hub_config(&with_db);
        let disabled = hub_config(&skipped);

        // then (期待する結果):
        assert!(enabled.verify_channel_access);
        assert!(!disabled.verify_channel_access);
    }

    #[tokio::test]
    async fn test_default_wiring_allows_join() {
        // テスト項目: 既定の設定とインメモリストアの組み合わせでチャンネルに参加できる
        // given (前提条件):
        let args = Args::parse_from(["agora-server"]);
        let store = Arc::new(InMemoryStore::new());
        let hub = Arc::new(Hub::new(
            hub_config(&args),
            store.clone(),
            store,
            Arc::new(SystemClock),
        ));
        let (conn, _rx) = Connection::new(
            Identity::new(UserId::new(1), "alice".to_string(), String::new()),
            8,
            Utc::now(),
        );
        hub.register(conn).await;

        // when (操作):
        let mut join = Envelope::new(MessageType::JoinChannel, Utc::now());
        join.sender_id = UserId::new(1);
        join.user_id = UserId::new(1);
        join.channel_id = ChannelId::new(5);
        hub.dispatch(join).await;

        // then (期待する結果):
        assert!(hub.is_channel_member(ChannelId::new(5), UserId::new(1)).await);
    }
}

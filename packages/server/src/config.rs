//! Hub configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens when a user id registers while it already has a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Evict the older connection: leave its channels and close its queue.
    #[default]
    ClosePrevious,
    /// Replace the client-table entry only. The older queue stays open until
    /// its own pump fails.
    KeepPrevious,
}

/// Configuration for the hub and its connection pumps.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Coordinator inbound command queue bound.
    pub inbox_capacity: usize,
    /// Per-connection outbound queue bound.
    pub outbound_capacity: usize,
    /// Keepalive ping period in milliseconds.
    pub ping_interval_ms: u64,
    /// Read deadline in milliseconds, renewed by any inbound frame.
    pub pong_wait_ms: u64,
    /// Per-write deadline in milliseconds.
    pub write_wait_ms: u64,
    /// Safety timeout around a channel fan-out in milliseconds.
    pub broadcast_timeout_ms: u64,
    /// Bound on a single authorization call in milliseconds.
    pub access_check_timeout_ms: u64,
    /// Number of messages returned by a history fetch.
    pub history_limit: usize,
    /// Consult the access checker before joining a channel.
    pub verify_channel_access: bool,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 100,
            outbound_capacity: 256,
            ping_interval_ms: 54_000,
            pong_wait_ms: 60_000,
            write_wait_ms: 10_000,
            broadcast_timeout_ms: 2_000,
            access_check_timeout_ms: 2_000,
            history_limit: 50,
            verify_channel_access: true,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl HubConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }

    pub fn access_check_timeout(&self) -> Duration {
        Duration::from_millis(self.access_check_timeout_ms)
    }
}

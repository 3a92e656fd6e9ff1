//! Real-time connection hub library.
//!
//! Accepts persistent WebSocket connections, keeps channel and direct-chat
//! membership in memory and fans events out to the right connections.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;

//! Data Transfer Objects
//!
//! - `websocket`: the bidirectional JSON envelope and its codec
//! - `http`: Broadcast Bridge request/response bodies

pub mod http;
pub mod websocket;

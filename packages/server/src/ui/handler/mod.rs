//! Request handlers.

mod http;
mod pump;
mod websocket;

pub use http::{broadcast_bridge, health_check};
pub use websocket::websocket_handler;

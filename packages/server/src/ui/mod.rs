//! UI 層: axum サーバー、WebSocket エンドポイント、HTTP ハンドラ

mod handler;
mod server;
mod signal;
pub mod state;

pub use server::Server;

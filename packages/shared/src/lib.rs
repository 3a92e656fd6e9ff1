//! Utilities shared by the Agora packages.

pub mod logger;
pub mod time;

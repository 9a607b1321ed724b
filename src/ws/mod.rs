//! Observer WebSocket and the JSON wire types

pub mod handler;
pub mod protocol;

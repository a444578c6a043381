//! `WebSocket` transport: per-connection state, the session task and the hub actor.

pub mod connection;
pub mod hub;
pub mod session;

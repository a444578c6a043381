//! # parley-server
//!
//! Axum HTTP + `WebSocket` transport for the Parley chat relay.
//!
//! - `GET /health` liveness check
//! - `GET /ws` upgrade with origin and connection-count checks
//! - A single hub actor task owning all chat state; sessions talk to it over
//!   one command channel, so every client observes the same event order
//! - Heartbeat pings with dead-peer detection
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod origin;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::ChatServer;

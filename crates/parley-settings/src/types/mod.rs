//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the keys it wants to change.

mod chat;
mod observability;
mod server;

pub use chat::*;
pub use observability::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 4000, "allowedOrigins": ["https://chat.example.com"] },
///   "chat": { "historyCapacity": 500 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// History and input limits.
    pub chat: ChatSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Prometheus exporter.
    pub metrics: MetricsSettings,
}

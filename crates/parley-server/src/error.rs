//! Server error types.

use thiserror::Error;

/// Errors from starting the server or its exporters.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// An address string could not be parsed.
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    /// The Prometheus exporter could not be installed.
    #[error("failed to install metrics exporter: {0}")]
    Metrics(String),
}

//! `/health` endpoint.

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `true` while the process is serving requests.
    pub ok: bool,
}

/// Build the health response.
pub fn health_check() -> HealthResponse {
    HealthResponse { ok: true }
}

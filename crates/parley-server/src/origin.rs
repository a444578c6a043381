//! Cross-origin policy for `/ws` and `/health`.

use axum::http::{HeaderValue, Method};
use parley_settings::ANY_ORIGIN;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

/// Which browser origins may connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Any origin; the request origin is mirrored back.
    Any,
    /// Only these exact origins.
    List(Vec<String>),
}

impl OriginPolicy {
    /// Build from configured patterns. A `"*"` entry (or an empty list)
    /// means any origin.
    pub fn from_patterns(patterns: &[String]) -> Self {
        if patterns.is_empty() || patterns.iter().any(|p| p == ANY_ORIGIN) {
            Self::Any
        } else {
            Self::List(
                patterns
                    .iter()
                    .map(|p| p.trim_end_matches('/').to_string())
                    .collect(),
            )
        }
    }

    /// Whether a WebSocket upgrade with this `Origin` header is allowed.
    ///
    /// Requests without an `Origin` header come from non-browser clients
    /// and are allowed.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (Self::Any, _) | (_, None) => true,
            (Self::List(allowed), Some(origin)) => allowed.iter().any(|a| a == origin),
        }
    }

    /// CORS layer for HTTP responses.
    pub fn cors_layer(&self) -> CorsLayer {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET])
            .allow_credentials(true);

        match self {
            Self::Any => cors.allow_origin(AllowOrigin::mirror_request()),
            Self::List(origins) => {
                let values = origins
                    .iter()
                    .filter_map(|origin| match HeaderValue::from_str(origin) {
                        Ok(v) => Some(v),
                        Err(_) => {
                            warn!(origin, "ignoring unparseable allowed origin");
                            None
                        }
                    })
                    .collect::<Vec<_>>();
                cors.allow_origin(AllowOrigin::list(values))
            }
        }
    }
}

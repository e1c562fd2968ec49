//! Security response headers.
//!
//! # Responsibilities
//! - Add X-Frame-Options, X-Content-Type-Options and CSP to every response
//! - Add HSTS in production only
//!
//! # Design Decisions
//! - Headers already set by the handler win
//! - Values are validated once at startup; a bad configured value is
//!   logged and left out rather than failing requests

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::HeadersConfig;

/// Precomputed header set.
#[derive(Debug, Clone, Default)]
pub struct SecurityHeaders {
    values: Arc<Vec<(HeaderName, HeaderValue)>>,
}

impl SecurityHeaders {
    pub fn from_config(config: &HeadersConfig, production: bool) -> Self {
        if !config.enabled {
            return Self::default();
        }

        let mut raw = vec![
            (header::X_FRAME_OPTIONS, config.frame_options.as_str()),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            (header::CONTENT_SECURITY_POLICY, config.content_security_policy.as_str()),
            (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
        ];
        if production {
            raw.push((header::STRICT_TRANSPORT_SECURITY, config.strict_transport_security.as_str()));
        }

        let values = raw
            .into_iter()
            .filter_map(|(name, value)| match HeaderValue::from_str(value) {
                Ok(v) => Some((name, v)),
                Err(_) => {
                    tracing::warn!(header = %name, "Invalid security header value, header disabled");
                    None
                }
            })
            .collect();

        Self {
            values: Arc::new(values),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn apply(&self, response: &mut Response) {
        let headers = response.headers_mut();
        for (name, value) in self.values.iter() {
            headers.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }
}

/// Middleware adding the configured header set.
pub async fn security_headers_middleware(
    State(headers): State<SecurityHeaders>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    headers.apply(&mut response);
    response
}

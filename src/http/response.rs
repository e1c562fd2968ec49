//! Rejection responses.
//!
//! # Responsibilities
//! - Render a guard rejection as the JSON error envelope
//! - Add `Retry-After` for rate limits
//! - Expire the session cookie when a binding was invalidated
//!
//! # Design Decisions
//! - Messages are user-facing German text; codes are stable identifiers
//! - Rejections never carry request details back to the client

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::security::Rejection;

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    success: bool,
    error: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    code: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

/// `Set-Cookie` value that deletes `name` on the client.
pub fn clear_cookie_value(name: &str) -> String {
    format!(
        "{name}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Strict"
    )
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: self.code.as_str(),
                message: self.message,
                retry_after: self.retry_after,
            },
        };
        let mut response = (self.status(), Json(envelope)).into_response();

        let headers = response.headers_mut();
        if let Some(secs) = self.retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        if let Some(cookie) = self.clear_cookie.as_deref() {
            match HeaderValue::from_str(&clear_cookie_value(cookie)) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(cookie, error = %e, "Cannot build cookie clearing header"),
            }
        }
        response
    }
}

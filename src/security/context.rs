//! Request view handed to the guards and the verdict they return.

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

/// Everything a guard may look at for one request.
#[derive(Debug, Clone)]
pub struct ClientContext {
    /// Client address as derived by [`client_ip`](crate::security::client_ip::client_ip).
    pub ip: String,
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    /// Path and query exactly as received.
    pub uri: String,
    pub headers: HeaderMap,
    /// Buffered body, when one was read for inspection.
    pub raw_body: Option<Bytes>,
}

impl ClientContext {
    pub fn new(ip: impl Into<String>, method: Method, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let path = uri.split('?').next().unwrap_or_default().to_string();
        Self {
            ip: ip.into(),
            method,
            path,
            uri,
            headers: HeaderMap::new(),
            raw_body: None,
        }
    }

    /// Builder helper used by tests and embedders. Invalid names or values
    /// are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.raw_body = Some(body.into());
        self
    }

    /// Header value as text. Non-UTF-8 values read as absent.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> &str {
        self.header(header::USER_AGENT).unwrap_or_default()
    }

    /// Value of cookie `name` from the `Cookie` header(s).
    pub fn cookie(&self, name: &str) -> Option<String> {
        cookie_value(&self.headers, name)
    }

    /// GET, HEAD and OPTIONS never change state.
    pub fn is_safe_method(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

/// Value of cookie `name` across all `Cookie` headers. Empty values read
/// as absent.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Stable machine-readable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionCode {
    RateLimited,
    CsrfOriginMismatch,
    CsrfRefererMismatch,
    SessionInvalid,
    InvalidRequest,
}

impl RejectionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionCode::RateLimited => "RATE_LIMITED",
            RejectionCode::CsrfOriginMismatch => "CSRF_ORIGIN_MISMATCH",
            RejectionCode::CsrfRefererMismatch => "CSRF_REFERER_MISMATCH",
            RejectionCode::SessionInvalid => "SESSION_INVALID",
            RejectionCode::InvalidRequest => "INVALID_REQUEST",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            RejectionCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RejectionCode::CsrfOriginMismatch | RejectionCode::CsrfRefererMismatch => {
                StatusCode::FORBIDDEN
            }
            RejectionCode::SessionInvalid => StatusCode::UNAUTHORIZED,
            RejectionCode::InvalidRequest => StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const MSG_LOGIN_RATE_LIMITED: &str =
    "Zu viele Anmeldeversuche. Bitte versuchen Sie es später erneut.";
pub const MSG_RATE_LIMITED: &str = "Zu viele Anfragen. Bitte versuchen Sie es später erneut.";
pub const MSG_CSRF_ORIGIN: &str = "Ungültige Anfrageherkunft.";
pub const MSG_CSRF_REFERER: &str = "Ungültiger Referer.";
pub const MSG_SESSION_INVALID: &str = "Ihre Sitzung ist ungültig. Bitte melden Sie sich erneut an.";
pub const MSG_INVALID_REQUEST: &str = "Ungültige Anfrage.";

/// A terminal verdict produced by a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: RejectionCode,
    pub message: &'static str,
    /// Seconds the client should wait, for rate limits.
    pub retry_after: Option<u64>,
    /// Cookie to expire on the client.
    pub clear_cookie: Option<String>,
}

impl Rejection {
    pub fn new(code: RejectionCode, message: &'static str) -> Self {
        Self {
            code,
            message,
            retry_after: None,
            clear_cookie: None,
        }
    }

    pub fn rate_limited(message: &'static str, retry_after: u64) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(RejectionCode::RateLimited, message)
        }
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }
}

/// Result of running a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Continue,
    Reject(Rejection),
}

impl GuardOutcome {
    pub fn is_continue(&self) -> bool {
        matches!(self, GuardOutcome::Continue)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            GuardOutcome::Continue => None,
            GuardOutcome::Reject(r) => Some(r),
        }
    }
}

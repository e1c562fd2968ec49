//! Security event reporting.
//!
//! Guards hand every rejection and every soft mismatch to a sink. Sinks
//! must not fail or block: recording an event can never affect the request
//! that produced it.

use std::sync::Mutex;

use crate::observability::metrics;
use crate::security::client_ip::truncate_ip;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityEventKind {
    /// A login attempt crossed the threshold and started a lockout.
    LoginLockout,
    /// A request hit an active lockout or the general cap.
    RateLimited,
    CsrfOriginMismatch,
    CsrfRefererMismatch,
    /// Session seen from a new IP or User-Agent and rebound.
    SessionMismatch,
    /// Session seen from a new IP or User-Agent and dropped.
    SessionInvalidated,
    SuspiciousPattern,
}

impl SecurityEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityEventKind::LoginLockout => "login_lockout",
            SecurityEventKind::RateLimited => "rate_limited",
            SecurityEventKind::CsrfOriginMismatch => "csrf_origin_mismatch",
            SecurityEventKind::CsrfRefererMismatch => "csrf_referer_mismatch",
            SecurityEventKind::SessionMismatch => "session_mismatch",
            SecurityEventKind::SessionInvalidated => "session_invalidated",
            SecurityEventKind::SuspiciousPattern => "suspicious_pattern",
        }
    }
}

/// One observation worth an operator's attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    /// Masked client address.
    pub ip: String,
    pub method: String,
    pub path: String,
    /// Free-form detail, e.g. matched signature names.
    pub detail: Vec<String>,
    /// Whether the request was stopped.
    pub blocked: bool,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, ip: &str, method: &str, path: &str) -> Self {
        Self {
            kind,
            ip: truncate_ip(ip),
            method: method.to_string(),
            path: path.to_string(),
            detail: Vec::new(),
            blocked: false,
        }
    }

    pub fn with_detail<I, S>(mut self, detail: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.detail = detail.into_iter().map(Into::into).collect();
        self
    }

    pub fn blocked(mut self, blocked: bool) -> Self {
        self.blocked = blocked;
        self
    }
}

/// Destination for security events.
pub trait SecurityEventSink: Send + Sync {
    fn record(&self, event: &SecurityEvent);
}

/// Default sink: a WARN line on the `security` target plus a counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl SecurityEventSink for TracingEventSink {
    fn record(&self, event: &SecurityEvent) {
        tracing::warn!(
            target: "security",
            kind = event.kind.as_str(),
            ip = %event.ip,
            method = %event.method,
            path = %event.path,
            detail = ?event.detail,
            blocked = event.blocked,
            "Security event"
        );
        metrics::record_security_event(event.kind.as_str());
    }
}

/// Keeps events in memory. Useful for embedding tests and the admin view.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: SecurityEventKind) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| ev.kind == kind).count())
            .unwrap_or_default()
    }
}

impl SecurityEventSink for RecordingEventSink {
    fn record(&self, event: &SecurityEvent) {
        // A poisoned lock drops the event instead of failing the request.
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_masks_ip() {
        let ev = SecurityEvent::new(SecurityEventKind::SuspiciousPattern, "198.51.100.23", "GET", "/x")
            .with_detail(["sql_union_select"]);
        assert_eq!(ev.ip, "198.51.100.x");
        assert_eq!(ev.detail, vec!["sql_union_select".to_string()]);
    }

    #[test]
    fn test_recording_sink_counts_by_kind() {
        let sink = RecordingEventSink::new();
        sink.record(&SecurityEvent::new(SecurityEventKind::RateLimited, "1.2.3.4", "POST", "/a"));
        sink.record(&SecurityEvent::new(SecurityEventKind::SessionMismatch, "1.2.3.4", "GET", "/b"));
        assert_eq!(sink.count(SecurityEventKind::RateLimited), 1);
        assert_eq!(sink.events().len(), 2);
    }
}

//! Process-wide guard state.
//!
//! `SecurityState` owns the three record stores, the active policy and the
//! event sink. It is created once at startup, shared through `Arc`, and is
//! the only path through which the stores change.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::config::GuardConfig;
use crate::security::clock::{Clock, SystemClock};
use crate::security::csrf::CsrfTokenEntry;
use crate::security::events::{SecurityEvent, SecurityEventSink, TracingEventSink};
use crate::security::rate_limit::RateLimitEntry;
use crate::security::session::SessionBinding;
use crate::security::store::ExpiringStore;

pub struct SecurityState {
    config: ArcSwap<GuardConfig>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn SecurityEventSink>,
    pub(crate) rate_limits: ExpiringStore<RateLimitEntry>,
    pub(crate) csrf_tokens: ExpiringStore<CsrfTokenEntry>,
    pub(crate) sessions: ExpiringStore<SessionBinding>,
}

/// Entry counts for the admin API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StateStats {
    pub rate_limit_entries: usize,
    pub blocked_clients: usize,
    pub csrf_tokens: usize,
    pub session_bindings: usize,
}

impl SecurityState {
    /// State with the system clock and the tracing event sink.
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            clock: Arc::new(SystemClock),
            events: Arc::new(TracingEventSink),
            rate_limits: ExpiringStore::new("rate_limits"),
            csrf_tokens: ExpiringStore::new("csrf_tokens"),
            sessions: ExpiringStore::new("sessions"),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn SecurityEventSink>) -> Self {
        self.events = events;
        self
    }

    /// Current policy snapshot.
    pub fn config(&self) -> Arc<GuardConfig> {
        self.config.load_full()
    }

    /// Swap in a new policy. Stored counters and bindings are kept.
    pub fn reload(&self, config: GuardConfig) {
        tracing::info!(
            max_login_attempts = config.max_login_attempts,
            general_rate_limit = config.general_rate_limit,
            csrf_enabled = config.csrf_enabled,
            strict_session_binding = config.strict_session_binding,
            "Guard policy updated"
        );
        self.config.store(Arc::new(config));
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub(crate) fn emit(&self, event: SecurityEvent) {
        self.events.record(&event);
    }

    pub fn stats(&self) -> StateStats {
        let now = self.now();
        StateStats {
            rate_limit_entries: self.rate_limits.len(),
            blocked_clients: self.rate_limits.count_where(|e| e.is_blocked_at(now)),
            csrf_tokens: self.csrf_tokens.len(),
            session_bindings: self.sessions.len(),
        }
    }
}

impl std::fmt::Debug for SecurityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityState")
            .field("clock", &self.clock)
            .field("rate_limits", &self.rate_limits.len())
            .field("csrf_tokens", &self.csrf_tokens.len())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

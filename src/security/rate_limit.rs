//! Fixed-window rate limiting with lockout backoff.
//!
//! Two policies share the `rate_limits` store:
//! - auth limiter, keyed by client IP, on login endpoints only; reaching a
//!   multiple of the threshold locks the client out for
//!   `window × 2^k`, capped at `max_block`
//! - general limiter, keyed `general:{ip}`, a hard per-minute cap on `/api`

use std::time::{Duration, Instant};

use crate::config::GuardConfig;
use crate::security::clock::seconds_until;
use crate::security::context::{
    ClientContext, GuardOutcome, Rejection, MSG_LOGIN_RATE_LIMITED, MSG_RATE_LIMITED,
};
use crate::security::events::{SecurityEvent, SecurityEventKind};
use crate::security::state::SecurityState;

/// Window of the general limiter.
pub const GENERAL_WINDOW: Duration = Duration::from_secs(60);

const GENERAL_KEY_PREFIX: &str = "general:";

/// Counter state for one client key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub first_request_at: Instant,
    pub blocked: bool,
    /// Set iff `blocked`.
    pub blocked_until: Option<Instant>,
}

impl RateLimitEntry {
    fn fresh(now: Instant) -> Self {
        Self {
            count: 0,
            first_request_at: now,
            blocked: false,
            blocked_until: None,
        }
    }

    /// Whether a lockout is in force at `now`.
    pub fn is_blocked_at(&self, now: Instant) -> bool {
        self.blocked && self.blocked_until.is_some_and(|until| now < until)
    }

    fn restart_window(&mut self, now: Instant) {
        self.count = 0;
        self.first_request_at = now;
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    Allowed {
        remaining: u32,
    },
    Limited {
        retry_after_secs: u64,
        until: Instant,
        /// This request started the lockout.
        new_block: bool,
    },
}

impl LimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LimitDecision::Allowed { .. })
    }
}

/// Lockout length for the `k`-th consecutive lockout cycle.
pub fn lockout_duration(window: Duration, k: u32, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(k).unwrap_or(u32::MAX);
    window.checked_mul(factor).unwrap_or(cap).min(cap)
}

pub fn general_key(ip: &str) -> String {
    format!("{GENERAL_KEY_PREFIX}{ip}")
}

/// Whether the auth limiter counts this request.
pub fn auth_limit_applies(config: &GuardConfig, ctx: &ClientContext) -> bool {
    !ctx.is_safe_method()
        && config.login_paths.iter().any(|p| *p == ctx.path)
        && !config
            .auth_excluded_paths
            .iter()
            .any(|p| ctx.path.starts_with(p.as_str()))
}

/// Whether the general limiter counts this request.
pub fn general_limit_applies(config: &GuardConfig, ctx: &ClientContext) -> bool {
    let is_api = ctx.path == "/api" || ctx.path.starts_with("/api/");
    if !is_api {
        return false;
    }
    if config
        .general_skip_paths
        .iter()
        .any(|p| ctx.path.starts_with(p.as_str()))
    {
        return false;
    }
    !(config.dev_bypass_get && !config.is_production() && ctx.method == axum::http::Method::GET)
}

impl SecurityState {
    /// Count a login attempt from `ip`.
    pub fn record_login_attempt(&self, ip: &str) -> LimitDecision {
        let config = self.config();
        let now = self.now();
        let window = config.auth_window();
        let threshold = config.max_login_attempts.max(1);
        let cap = config.max_block();

        self.rate_limits.update(ip, || RateLimitEntry::fresh(now), |entry| {
            if entry.blocked {
                match entry.blocked_until {
                    Some(until) if now < until => {
                        return LimitDecision::Limited {
                            retry_after_secs: seconds_until(now, until),
                            until,
                            new_block: false,
                        };
                    }
                    // Lockout served. A client that comes back within one
                    // window keeps its count so the next cycle escalates;
                    // one that stayed away longer starts over.
                    Some(until) if now.saturating_duration_since(until) <= window => {
                        entry.blocked = false;
                        entry.blocked_until = None;
                        entry.first_request_at = now;
                    }
                    _ => {
                        entry.blocked = false;
                        entry.blocked_until = None;
                        entry.restart_window(now);
                    }
                }
            } else if now.saturating_duration_since(entry.first_request_at) > window {
                entry.restart_window(now);
            }

            entry.count = entry.count.saturating_add(1);

            if entry.count % threshold == 0 {
                let k = entry.count / threshold - 1;
                let until = now + lockout_duration(window, k, cap);
                entry.blocked = true;
                entry.blocked_until = Some(until);
                return LimitDecision::Limited {
                    retry_after_secs: seconds_until(now, until),
                    until,
                    new_block: true,
                };
            }

            LimitDecision::Allowed {
                remaining: threshold - entry.count % threshold,
            }
        })
    }

    /// Count a request against the per-minute cap of `ip`.
    pub fn record_general_request(&self, ip: &str) -> LimitDecision {
        let limit = self.config().general_rate_limit;
        let now = self.now();

        self.rate_limits.update(general_key(ip), || RateLimitEntry::fresh(now), |entry| {
            if now.saturating_duration_since(entry.first_request_at) > GENERAL_WINDOW {
                entry.restart_window(now);
            }
            if entry.count >= limit {
                let until = entry.first_request_at + GENERAL_WINDOW;
                return LimitDecision::Limited {
                    retry_after_secs: seconds_until(now, until),
                    until,
                    new_block: false,
                };
            }
            entry.count += 1;
            LimitDecision::Allowed {
                remaining: limit - entry.count,
            }
        })
    }

    /// Forget both limiter entries of `ip`. Called after a successful login.
    pub fn reset_login_attempts(&self, ip: &str) {
        let auth = self.rate_limits.remove(ip).is_some();
        let general = self.rate_limits.remove(&general_key(ip)).is_some();
        tracing::debug!(ip = %crate::security::client_ip::truncate_ip(ip), auth, general, "Login attempts reset");
    }

    /// Snapshot of the auth limiter entry for `ip`.
    pub fn login_attempts(&self, ip: &str) -> Option<RateLimitEntry> {
        self.rate_limits.get(ip)
    }

    /// Auth limiter guard.
    pub fn check_auth_limit(&self, ctx: &ClientContext) -> GuardOutcome {
        if !auth_limit_applies(&self.config(), ctx) {
            return GuardOutcome::Continue;
        }
        match self.record_login_attempt(&ctx.ip) {
            LimitDecision::Allowed { .. } => GuardOutcome::Continue,
            LimitDecision::Limited {
                retry_after_secs,
                new_block,
                ..
            } => {
                let kind = if new_block {
                    SecurityEventKind::LoginLockout
                } else {
                    SecurityEventKind::RateLimited
                };
                self.emit(
                    SecurityEvent::new(kind, &ctx.ip, ctx.method.as_str(), &ctx.path)
                        .with_detail([format!("retry_after={retry_after_secs}")])
                        .blocked(true),
                );
                GuardOutcome::Reject(Rejection::rate_limited(
                    MSG_LOGIN_RATE_LIMITED,
                    retry_after_secs,
                ))
            }
        }
    }

    /// General limiter guard.
    pub fn check_general_limit(&self, ctx: &ClientContext) -> GuardOutcome {
        if !general_limit_applies(&self.config(), ctx) {
            return GuardOutcome::Continue;
        }
        match self.record_general_request(&ctx.ip) {
            LimitDecision::Allowed { .. } => GuardOutcome::Continue,
            LimitDecision::Limited { retry_after_secs, .. } => {
                self.emit(
                    SecurityEvent::new(
                        SecurityEventKind::RateLimited,
                        &ctx.ip,
                        ctx.method.as_str(),
                        &ctx.path,
                    )
                    .with_detail(["general".to_string(), format!("retry_after={retry_after_secs}")])
                    .blocked(true),
                );
                GuardOutcome::Reject(Rejection::rate_limited(MSG_RATE_LIMITED, retry_after_secs))
            }
        }
    }

    /// Drop limiter entries older than twice their window. Entries inside
    /// an active lockout are kept whatever their age.
    pub(crate) fn sweep_rate_limits(&self, now: Instant) -> usize {
        let auth_window = self.config().auth_window();
        self.rate_limits.sweep(|key, entry| {
            let window = if key.starts_with(GENERAL_KEY_PREFIX) {
                GENERAL_WINDOW
            } else {
                auth_window
            };
            !entry.is_blocked_at(now)
                && now.saturating_duration_since(entry.first_request_at) > window * 2
        })
    }
}

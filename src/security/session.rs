//! Session binding.
//!
//! A session id is tied to the IP and User-Agent it was first seen with.
//! When either changes, strict mode drops the session; soft mode reports
//! the change and rebinds, tolerating mobile and proxy churn.

use dashmap::mapref::entry::Entry;
use std::time::Instant;

use crate::security::context::{ClientContext, GuardOutcome, Rejection, RejectionCode, MSG_SESSION_INVALID};
use crate::security::events::{SecurityEvent, SecurityEventKind};
use crate::security::state::SecurityState;
use crate::security::token::hash_user_agent;

/// Identity a session was first observed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    pub ip: String,
    pub user_agent_hash: String,
    pub created_at: Instant,
}

impl SessionBinding {
    fn matches(&self, ip: &str, user_agent_hash: &str) -> bool {
        self.ip == ip && self.user_agent_hash == user_agent_hash
    }
}

enum BindingCheck {
    Created,
    Matched,
    Rebound { changed: Vec<&'static str> },
    Invalidated { changed: Vec<&'static str> },
}

fn changed_fields(binding: &SessionBinding, ip: &str, ua_hash: &str) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if binding.ip != ip {
        changed.push("ip");
    }
    if binding.user_agent_hash != ua_hash {
        changed.push("user_agent");
    }
    changed
}

impl SecurityState {
    /// Record the identity of a freshly authenticated session.
    pub fn create_session_binding(&self, session_id: &str, ip: &str, user_agent: &str) {
        let binding = SessionBinding {
            ip: ip.to_string(),
            user_agent_hash: hash_user_agent(user_agent),
            created_at: self.now(),
        };
        self.sessions.insert(session_id, binding);
    }

    /// Forget a session, e.g. on logout. Returns whether one existed.
    pub fn remove_session_binding(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn session_binding(&self, session_id: &str) -> Option<SessionBinding> {
        self.sessions.get(session_id)
    }

    /// Session binder guard.
    pub fn check_session(&self, ctx: &ClientContext) -> GuardOutcome {
        let config = self.config();
        if !config.session_binding_enabled {
            return GuardOutcome::Continue;
        }
        let Some(session_id) = ctx.cookie(&config.session_cookie) else {
            return GuardOutcome::Continue;
        };

        let now = self.now();
        let ttl = config.session_ttl();
        let ua_hash = hash_user_agent(ctx.user_agent());
        let fresh = || SessionBinding {
            ip: ctx.ip.clone(),
            user_agent_hash: ua_hash.clone(),
            created_at: now,
        };

        let check = match self.sessions.entry(session_id) {
            Entry::Vacant(slot) => {
                slot.insert(fresh());
                BindingCheck::Created
            }
            // A binding past its lifetime that the sweep has not reached
            // yet is treated as absent.
            Entry::Occupied(mut slot) if now.saturating_duration_since(slot.get().created_at) > ttl => {
                slot.insert(fresh());
                BindingCheck::Created
            }
            Entry::Occupied(slot) if slot.get().matches(&ctx.ip, &ua_hash) => BindingCheck::Matched,
            Entry::Occupied(slot) if config.strict_session_binding => {
                let changed = changed_fields(slot.get(), &ctx.ip, &ua_hash);
                slot.remove();
                BindingCheck::Invalidated { changed }
            }
            Entry::Occupied(mut slot) => {
                let binding = slot.get_mut();
                let changed = changed_fields(binding, &ctx.ip, &ua_hash);
                binding.ip = ctx.ip.clone();
                binding.user_agent_hash = ua_hash.clone();
                BindingCheck::Rebound { changed }
            }
        };

        match check {
            BindingCheck::Created | BindingCheck::Matched => GuardOutcome::Continue,
            BindingCheck::Rebound { changed } => {
                self.emit(
                    SecurityEvent::new(
                        SecurityEventKind::SessionMismatch,
                        &ctx.ip,
                        ctx.method.as_str(),
                        &ctx.path,
                    )
                    .with_detail(changed),
                );
                GuardOutcome::Continue
            }
            BindingCheck::Invalidated { changed } => {
                self.emit(
                    SecurityEvent::new(
                        SecurityEventKind::SessionInvalidated,
                        &ctx.ip,
                        ctx.method.as_str(),
                        &ctx.path,
                    )
                    .with_detail(changed)
                    .blocked(true),
                );
                GuardOutcome::Reject(Rejection {
                    clear_cookie: Some(config.session_cookie.clone()),
                    ..Rejection::new(RejectionCode::SessionInvalid, MSG_SESSION_INVALID)
                })
            }
        }
    }

    pub(crate) fn sweep_sessions(&self, now: Instant) -> usize {
        let ttl = self.config().session_ttl();
        self.sessions
            .sweep(|_, binding| now.saturating_duration_since(binding.created_at) > ttl)
    }
}

//! Cross-site request forgery protection.
//!
//! # Responsibilities
//! - Reject state-changing requests whose `Origin` is not allow-listed
//! - In production, reject requests whose `Referer` host is foreign
//! - Issue and verify standalone CSRF tokens for embedders that want them
//!
//! # Design Decisions
//! - Requests carrying neither header pass; SameSite cookies cover them
//! - An unparsable `Referer` makes the referer check inconclusive, not fatal
//! - Outside production, localhost origins the browser actually sent are
//!   reflected into the allow-list so any dev-proxy port works

use std::collections::HashSet;
use std::time::Instant;
use url::Url;

use crate::config::GuardConfig;
use crate::security::context::{
    ClientContext, GuardOutcome, Rejection, RejectionCode, MSG_CSRF_ORIGIN, MSG_CSRF_REFERER,
};
use crate::security::events::{SecurityEvent, SecurityEventKind};
use crate::security::state::SecurityState;
use crate::security::token::{constant_time_eq, generate_token};

/// An issued CSRF token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfTokenEntry {
    pub token: String,
    pub expires: Instant,
    pub session_id: Option<String>,
}

const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

/// Compute the origins a state-changing request may come from.
pub fn allowed_origins(config: &GuardConfig, host: Option<&str>, origin: Option<&str>) -> Vec<String> {
    let production = config.is_production();
    let mut allowed = Vec::new();

    if let Some(app_url) = &config.app_url {
        allowed.push(normalize_origin(app_url));
    }

    if let Some(host) = host.map(str::trim).filter(|h| !h.is_empty()) {
        allowed.push(format!("https://{host}"));
        if !production {
            allowed.push(format!("http://{host}"));
        }
    }

    if !production {
        allowed.extend(config.dev_origins.iter().map(|o| normalize_origin(o)));
        if let Some(origin) = origin.and_then(|o| Url::parse(o).ok()) {
            let local = origin
                .host_str()
                .is_some_and(|h| LOCAL_HOSTS.contains(&h));
            if local {
                allowed.push(origin.origin().ascii_serialization());
            }
        }
    }

    let mut seen = HashSet::new();
    allowed.retain(|o| seen.insert(o.clone()));
    allowed
}

fn normalize_origin(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) if url.has_host() => url.origin().ascii_serialization(),
        _ => raw.trim_end_matches('/').to_string(),
    }
}

/// Prefix match that only succeeds on an origin boundary, so
/// `https://app.example` does not admit `https://app.example.evil`.
pub fn origin_matches(origin: &str, allowed: &str) -> bool {
    let origin = origin.trim_end_matches('/');
    match origin.strip_prefix(allowed) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with(':'),
        None => false,
    }
}

fn allowed_hosts(allowed: &[String]) -> Vec<String> {
    allowed
        .iter()
        .filter_map(|o| Url::parse(o).ok())
        .filter_map(|u| u.host_str().map(str::to_ascii_lowercase))
        .collect()
}

impl SecurityState {
    /// CSRF guard.
    pub fn check_csrf(&self, ctx: &ClientContext) -> GuardOutcome {
        let config = self.config();
        if !config.csrf_enabled || ctx.is_safe_method() {
            return GuardOutcome::Continue;
        }

        let origin = ctx.header("origin");
        let allowed = allowed_origins(&config, ctx.header("host"), origin);

        if let Some(origin) = origin {
            if !allowed.iter().any(|a| origin_matches(origin, a)) {
                self.emit(
                    SecurityEvent::new(
                        SecurityEventKind::CsrfOriginMismatch,
                        &ctx.ip,
                        ctx.method.as_str(),
                        &ctx.path,
                    )
                    .with_detail([origin])
                    .blocked(true),
                );
                return GuardOutcome::Reject(Rejection::new(
                    RejectionCode::CsrfOriginMismatch,
                    MSG_CSRF_ORIGIN,
                ));
            }
        }

        if config.is_production() {
            if let Some(referer) = ctx.header("referer") {
                let referer_host = Url::parse(referer)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
                match referer_host {
                    Some(host) if !allowed_hosts(&allowed).contains(&host) => {
                        self.emit(
                            SecurityEvent::new(
                                SecurityEventKind::CsrfRefererMismatch,
                                &ctx.ip,
                                ctx.method.as_str(),
                                &ctx.path,
                            )
                            .with_detail([host])
                            .blocked(true),
                        );
                        return GuardOutcome::Reject(Rejection::new(
                            RejectionCode::CsrfRefererMismatch,
                            MSG_CSRF_REFERER,
                        ));
                    }
                    Some(_) => {}
                    None => {
                        tracing::debug!(path = %ctx.path, "Unparsable referer, skipping referer check");
                    }
                }
            }
        }

        GuardOutcome::Continue
    }

    /// Issue a token valid for the configured lifetime, optionally tied to
    /// a session.
    pub fn issue_csrf_token(&self, session_id: Option<&str>) -> String {
        let token = generate_token(32);
        let expires = self.now() + self.config().csrf_token_ttl();
        self.csrf_tokens.insert(
            token.clone(),
            CsrfTokenEntry {
                token: token.clone(),
                expires,
                session_id: session_id.map(str::to_string),
            },
        );
        token
    }

    /// Check a token. Tokens bound to a session only verify for it.
    pub fn verify_csrf_token(&self, token: &str, session_id: Option<&str>) -> bool {
        let now = self.now();
        match self.csrf_tokens.get(token) {
            Some(entry) if now <= entry.expires => match (&entry.session_id, session_id) {
                (None, _) => constant_time_eq(&entry.token, token),
                (Some(bound), Some(sid)) => {
                    constant_time_eq(&entry.token, token) && constant_time_eq(bound, sid)
                }
                (Some(_), None) => false,
            },
            _ => false,
        }
    }

    pub(crate) fn sweep_csrf_tokens(&self, now: Instant) -> usize {
        self.csrf_tokens.sweep(|_, entry| now > entry.expires)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::security::clock::{Clock, ManualClock};
    use axum::http::Method;
    use std::sync::Arc;
    use std::time::Duration;

    fn config(production: bool) -> GuardConfig {
        GuardConfig {
            environment: if production { Environment::Production } else { Environment::Development },
            app_url: Some("https://app.example/".into()),
            ..GuardConfig::default()
        }
    }

    fn post(origin: Option<&str>) -> ClientContext {
        let ctx = ClientContext::new("1.2.3.4", Method::POST, "/api/products")
            .with_header("host", "app.example");
        match origin {
            Some(o) => ctx.with_header("origin", o),
            None => ctx,
        }
    }

    #[test]
    fn test_allow_list_contents() {
        let prod = allowed_origins(&config(true), Some("app.example"), None);
        // App URL and Host collapse into one entry; no http:// in production.
        assert_eq!(prod, vec!["https://app.example".to_string()]);

        let dev = allowed_origins(&config(false), Some("api.internal:8080"), Some("http://localhost:4321"));
        assert!(dev.contains(&"http://api.internal:8080".to_string()));
        assert!(dev.contains(&"http://localhost:3000".to_string()));
        assert!(dev.contains(&"http://localhost:4321".to_string()));
    }

    #[test]
    fn test_allow_list_has_no_duplicates() {
        // Host, the dev list and the reflected origin all name localhost:3000.
        let dev = allowed_origins(&config(false), Some("localhost:3000"), Some("http://localhost:3000"));
        let copies = dev.iter().filter(|o| *o == "http://localhost:3000").count();
        assert_eq!(copies, 1, "{dev:?}");
        assert_eq!(dev[0], "https://app.example");

        let unique: HashSet<_> = dev.iter().collect();
        assert_eq!(unique.len(), dev.len());
    }

    #[test]
    fn test_origin_boundary() {
        assert!(origin_matches("https://app.example", "https://app.example"));
        assert!(origin_matches("https://app.example/", "https://app.example"));
        assert!(!origin_matches("https://app.example.evil", "https://app.example"));
        assert!(!origin_matches("https://evil.example", "https://app.example"));
    }

    #[test]
    fn test_foreign_origin_rejected() {
        let state = SecurityState::new(config(true));
        let outcome = state.check_csrf(&post(Some("https://evil.example")));
        assert_eq!(outcome.rejection().unwrap().code, RejectionCode::CsrfOriginMismatch);
        assert!(state.check_csrf(&post(Some("https://app.example"))).is_continue());
    }

    #[test]
    fn test_no_headers_pass() {
        let state = SecurityState::new(config(true));
        assert!(state.check_csrf(&post(None)).is_continue());
    }

    #[test]
    fn test_safe_methods_and_disabled_guard_pass() {
        let state = SecurityState::new(config(true));
        let get = ClientContext::new("1.2.3.4", Method::GET, "/api/products")
            .with_header("origin", "https://evil.example");
        assert!(state.check_csrf(&get).is_continue());

        state.reload(GuardConfig { csrf_enabled: false, ..config(true) });
        assert!(state.check_csrf(&post(Some("https://evil.example"))).is_continue());
    }

    #[test]
    fn test_referer_checked_in_production_only() {
        let foreign = post(None).with_header("referer", "https://evil.example/form");
        let state = SecurityState::new(config(true));
        assert_eq!(
            state.check_csrf(&foreign).rejection().unwrap().code,
            RejectionCode::CsrfRefererMismatch
        );
        let own = post(None).with_header("referer", "https://app.example/products/1");
        assert!(state.check_csrf(&own).is_continue());

        let garbage = post(None).with_header("referer", "::not a url::");
        assert!(state.check_csrf(&garbage).is_continue());

        let dev = SecurityState::new(config(false));
        assert!(dev.check_csrf(&foreign).is_continue());
    }

    #[test]
    fn test_token_issue_and_expiry() {
        let clock = Arc::new(ManualClock::new());
        let state = SecurityState::new(GuardConfig::default()).with_clock(clock.clone());

        let open = state.issue_csrf_token(None);
        let bound = state.issue_csrf_token(Some("s1"));
        assert!(state.verify_csrf_token(&open, None));
        assert!(state.verify_csrf_token(&bound, Some("s1")));
        assert!(!state.verify_csrf_token(&bound, Some("s2")));
        assert!(!state.verify_csrf_token(&bound, None));
        assert!(!state.verify_csrf_token("nope", None));

        clock.advance(Duration::from_secs(3601));
        assert!(!state.verify_csrf_token(&open, None));
        assert_eq!(state.sweep_csrf_tokens(clock.now()), 2);
    }
}

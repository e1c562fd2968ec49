//! End-to-end guard behavior through the layered router.

use axum::body::Body;
use axum::http::{Method, StatusCode};
use std::time::Duration;

use request_guard::config::{Environment, GuardConfig};
use request_guard::security::SecurityEventKind;

mod common;
use common::{login, request, Harness};

const WINDOW: Duration = Duration::from_secs(900);

fn production() -> GuardConfig {
    GuardConfig {
        environment: Environment::Production,
        app_url: Some("https://app.example".into()),
        ..GuardConfig::default()
    }
}

fn session_cookie(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn test_login_lockout_after_threshold() {
    let h = Harness::new(GuardConfig::default());

    for _ in 0..4 {
        let res = h.send(login("10.0.0.1", "wrong")).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.code(), Some("INVALID_CREDENTIALS"));
    }

    let fifth = h.send(login("10.0.0.1", "wrong")).await;
    assert_eq!(fifth.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(fifth.code(), Some("RATE_LIMITED"));
    assert_eq!(fifth.header("retry-after"), Some("900"));
    assert_eq!(fifth.json["error"]["retryAfter"], 900);

    // Still blocked; the correct password does not help and the block is
    // not extended.
    h.clock.advance(Duration::from_secs(100));
    let blocked = h.send(login("10.0.0.1", "demo-password")).await;
    assert_eq!(blocked.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(blocked.header("retry-after"), Some("800"));

    // Other clients are unaffected.
    let other = h.send(login("10.0.0.2", "wrong")).await;
    assert_eq!(other.status, StatusCode::UNAUTHORIZED);

    assert_eq!(h.events.count(SecurityEventKind::LoginLockout), 1);
    assert_eq!(h.events.count(SecurityEventKind::RateLimited), 1);
}

#[tokio::test]
async fn test_second_lockout_doubles() {
    let h = Harness::new(GuardConfig::default());

    for _ in 0..5 {
        h.send(login("10.0.0.1", "wrong")).await;
    }
    h.clock.advance(WINDOW + Duration::from_secs(1));

    for _ in 0..4 {
        let res = h.send(login("10.0.0.1", "wrong")).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }
    let second = h.send(login("10.0.0.1", "wrong")).await;
    assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.header("retry-after"), Some("1800"));
}

#[tokio::test]
async fn test_lockout_capped_at_max_block() {
    let config = GuardConfig {
        max_login_attempts: 1,
        rate_limit_window_ms: 3_600_000,
        ..GuardConfig::default()
    };
    let h = Harness::new(config);
    let mut last = String::new();

    // 1h, 2h, 4h, 8h, 16h, then the 24h cap.
    for _ in 0..7 {
        let res = h.send(login("10.0.0.1", "wrong")).await;
        assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
        last = res.header("retry-after").unwrap().to_string();
        let secs: u64 = last.parse().unwrap();
        h.clock.advance(Duration::from_secs(secs + 1));
    }
    assert_eq!(last, "86400");
}

#[tokio::test]
async fn test_window_reset_restarts_count() {
    let h = Harness::new(GuardConfig::default());

    for _ in 0..4 {
        h.send(login("10.0.0.1", "wrong")).await;
    }
    h.clock.advance(WINDOW + Duration::from_millis(1));

    let res = h.send(login("10.0.0.1", "wrong")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.state.login_attempts("10.0.0.1").unwrap().count, 1);
}

#[tokio::test]
async fn test_successful_login_resets_and_binds_session() {
    let h = Harness::new(GuardConfig::default());

    for _ in 0..4 {
        h.send(login("10.0.0.1", "wrong")).await;
    }
    let ok = h.send(login("10.0.0.1", "demo-password")).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert!(h.state.login_attempts("10.0.0.1").is_none());

    let cookie = session_cookie(ok.header("set-cookie").unwrap());
    let session_id = cookie.trim_start_matches("sessionId=");
    let binding = h.state.session_binding(session_id).unwrap();
    assert_eq!(binding.ip, "10.0.0.1");

    let whoami = h
        .send(
            request(Method::GET, "/api/auth/whoami", "10.0.0.1")
                .header("cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(whoami.json["authenticated"], true);
}

#[tokio::test]
async fn test_reset_unblocks_immediately() {
    let h = Harness::new(GuardConfig::default());

    for _ in 0..5 {
        h.send(login("10.0.0.1", "wrong")).await;
    }
    assert_eq!(h.send(login("10.0.0.1", "demo-password")).await.status, StatusCode::TOO_MANY_REQUESTS);

    h.state.reset_login_attempts("10.0.0.1");
    assert_eq!(h.send(login("10.0.0.1", "demo-password")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_excluded_auth_paths_not_throttled() {
    let config = GuardConfig { max_login_attempts: 1, ..GuardConfig::default() };
    let h = Harness::new(config);

    for _ in 0..3 {
        let res = h
            .send(
                request(Method::POST, "/api/auth/forgot-password", "10.0.0.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }
    assert!(h.state.login_attempts("10.0.0.1").is_none());
}

#[tokio::test]
async fn test_csrf_origin_allow_and_deny() {
    let h = Harness::new(production());

    let evil = h
        .send(
            request(Method::POST, "/api/auth/logout", "10.0.0.1")
                .header("origin", "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(evil.status, StatusCode::FORBIDDEN);
    assert_eq!(evil.code(), Some("CSRF_ORIGIN_MISMATCH"));
    assert_eq!(h.events.count(SecurityEventKind::CsrfOriginMismatch), 1);

    let lookalike = h
        .send(
            request(Method::POST, "/api/auth/logout", "10.0.0.1")
                .header("origin", "https://app.example.evil")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(lookalike.code(), Some("CSRF_ORIGIN_MISMATCH"));

    let good = h
        .send(
            request(Method::POST, "/api/auth/logout", "10.0.0.1")
                .header("origin", "https://app.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(good.status, StatusCode::OK);
}

#[tokio::test]
async fn test_csrf_referer_checked_in_production() {
    let h = Harness::new(production());

    let evil = h
        .send(
            request(Method::POST, "/api/auth/logout", "10.0.0.1")
                .header("referer", "https://evil.example/form")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(evil.status, StatusCode::FORBIDDEN);
    assert_eq!(evil.code(), Some("CSRF_REFERER_MISMATCH"));

    let good = h
        .send(
            request(Method::POST, "/api/auth/logout", "10.0.0.1")
                .header("referer", "https://app.example/settings")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(good.status, StatusCode::OK);
}

#[tokio::test]
async fn test_csrf_token_round_trip() {
    let h = Harness::new(GuardConfig::default());

    let issued = h
        .send(
            request(Method::GET, "/api/csrf-token", "10.0.0.1")
                .header("cookie", "sessionId=s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let token = issued.json["csrfToken"].as_str().unwrap().to_string();

    let body = r#"{"name":"widget"}"#;
    let created = h
        .send(
            request(Method::POST, "/api/items", "10.0.0.1")
                .header("origin", "http://localhost:5173")
                .header("cookie", "sessionId=s1")
                .header("x-csrf-token", &token)
                .header("content-type", "application/json")
                .header("content-length", body.len().to_string())
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.json["item"]["name"], "widget");

    // A token bound to s1 does not verify for another session.
    let foreign = h
        .send(
            request(Method::POST, "/api/items", "10.0.0.1")
                .header("cookie", "sessionId=s2")
                .header("x-csrf-token", &token)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(foreign.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_session_soft_rebind_records_event() {
    let h = Harness::new(GuardConfig::default());

    let ok = h.send(login("10.0.0.1", "demo-password")).await;
    let cookie = session_cookie(ok.header("set-cookie").unwrap());
    let session_id = cookie.trim_start_matches("sessionId=").to_string();

    let moved = h
        .send(
            request(Method::GET, "/api/auth/whoami", "10.0.0.2")
                .header("cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(moved.status, StatusCode::OK);
    assert_eq!(moved.json["authenticated"], true);
    assert_eq!(h.events.count(SecurityEventKind::SessionMismatch), 1);
    assert_eq!(h.state.session_binding(&session_id).unwrap().ip, "10.0.0.2");
}

#[tokio::test]
async fn test_session_strict_rejects_and_clears_cookie() {
    let config = GuardConfig { strict_session_binding: true, ..GuardConfig::default() };
    let h = Harness::new(config);

    let ok = h.send(login("10.0.0.1", "demo-password")).await;
    let cookie = session_cookie(ok.header("set-cookie").unwrap());
    let session_id = cookie.trim_start_matches("sessionId=").to_string();

    let moved = h
        .send(
            request(Method::GET, "/api/auth/whoami", "10.0.0.2")
                .header("cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(moved.status, StatusCode::UNAUTHORIZED);
    assert_eq!(moved.code(), Some("SESSION_INVALID"));
    let cleared = moved.header("set-cookie").unwrap();
    assert!(cleared.starts_with("sessionId=;"));
    assert!(cleared.contains("Max-Age=0"));
    assert!(h.state.session_binding(&session_id).is_none());
    assert_eq!(h.events.count(SecurityEventKind::SessionInvalidated), 1);
}

#[tokio::test]
async fn test_union_select_per_environment() {
    let uri = "/api/items?q=1%20UNION%20SELECT%20password%20FROM%20users";

    let dev = Harness::new(GuardConfig::default());
    let res = dev
        .send(request(Method::GET, uri, "10.0.0.1").body(Body::empty()).unwrap())
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let events = dev.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SecurityEventKind::SuspiciousPattern);
    assert!(events[0].detail.iter().any(|d| d == "sql_union_select"));
    assert!(!events[0].blocked);
    assert_eq!(events[0].ip, "10.0.0.x");

    let prod = Harness::new(production());
    let res = prod
        .send(request(Method::GET, uri, "10.0.0.1").body(Body::empty()).unwrap())
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.code(), Some("INVALID_REQUEST"));
    assert_eq!(prod.events.count(SecurityEventKind::SuspiciousPattern), 1);
}

#[tokio::test]
async fn test_body_scan_and_exemptions() {
    let h = Harness::new(production());
    let payload = r#"{"comment":"<script>alert(1)</script>"}"#;

    let scanned = h
        .send(
            request(Method::POST, "/api/items", "10.0.0.1")
                .header("content-type", "application/json")
                .header("content-length", payload.len().to_string())
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;
    assert_eq!(scanned.status, StatusCode::BAD_REQUEST);

    // Exempt endpoints receive HTML on purpose.
    let exempt = h
        .send(
            request(Method::POST, "/api/scrape", "10.0.0.1")
                .header("content-length", payload.len().to_string())
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;
    assert_eq!(exempt.status, StatusCode::NOT_FOUND);

    // Leaving out the length header does not skip the scan.
    let unsized_body = h
        .send(
            request(Method::POST, "/api/items", "10.0.0.1")
                .header("content-type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;
    assert_eq!(unsized_body.status, StatusCode::BAD_REQUEST);
    assert_eq!(unsized_body.code(), Some("INVALID_REQUEST"));
    assert_eq!(h.events.count(SecurityEventKind::SuspiciousPattern), 2);
}

#[tokio::test]
async fn test_login_body_scanned_without_length() {
    let h = Harness::new(production());
    let body = r#"{"username":"anna","password":"x' OR 1=1 --"}"#;

    for with_length in [true, false] {
        let mut builder = request(Method::POST, "/api/auth/login", "10.0.0.1")
            .header("content-type", "application/json");
        if with_length {
            builder = builder.header("content-length", body.len().to_string());
        }
        let res = h.send(builder.body(Body::from(body)).unwrap()).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "content-length: {with_length}");
        assert_eq!(res.code(), Some("INVALID_REQUEST"));
    }
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let config = GuardConfig { max_body_bytes: 64, ..production() };
    let h = Harness::new(config);
    let big = format!(r#"{{"name":"{}"}}"#, "a".repeat(200));

    let declared = h
        .send(
            request(Method::POST, "/api/items", "10.0.0.1")
                .header("content-type", "application/json")
                .header("content-length", big.len().to_string())
                .body(Body::from(big.clone()))
                .unwrap(),
        )
        .await;
    assert_eq!(declared.status, StatusCode::BAD_REQUEST);
    assert_eq!(declared.code(), Some("INVALID_REQUEST"));

    let streamed = h
        .send(
            request(Method::POST, "/api/items", "10.0.0.1")
                .header("content-type", "application/json")
                .body(Body::from(big))
                .unwrap(),
        )
        .await;
    assert_eq!(streamed.status, StatusCode::BAD_REQUEST);
    assert_eq!(streamed.code(), Some("INVALID_REQUEST"));

    // Small clean bodies without a length still reach the handler.
    let small = h
        .send(
            request(Method::POST, "/api/items", "10.0.0.1")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"ok"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(small.status, StatusCode::FORBIDDEN);
    assert_eq!(small.code(), Some("CSRF_TOKEN_INVALID"));
}

#[tokio::test]
async fn test_general_limit_per_minute() {
    let config = GuardConfig { general_rate_limit: 3, ..GuardConfig::default() };
    let h = Harness::new(config);
    let get = || request(Method::GET, "/api/items", "10.0.0.1").body(Body::empty()).unwrap();

    for _ in 0..3 {
        assert_eq!(h.send(get()).await.status, StatusCode::OK);
    }
    h.clock.advance(Duration::from_secs(20));
    let limited = h.send(get()).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.header("retry-after"), Some("40"));

    // Skipped endpoints are never counted.
    let health = h
        .send(request(Method::GET, "/api/health", "10.0.0.1").body(Body::empty()).unwrap())
        .await;
    assert_eq!(health.status, StatusCode::OK);

    h.clock.advance(Duration::from_secs(41));
    assert_eq!(h.send(get()).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_dev_get_bypass_only_when_enabled() {
    let config = GuardConfig {
        general_rate_limit: 1,
        dev_bypass_get: true,
        ..GuardConfig::default()
    };
    let h = Harness::new(config);
    for _ in 0..3 {
        let res = h
            .send(request(Method::GET, "/api/items", "10.0.0.1").body(Body::empty()).unwrap())
            .await;
        assert_eq!(res.status, StatusCode::OK);
    }

    let prod = Harness::new(GuardConfig {
        general_rate_limit: 1,
        dev_bypass_get: true,
        ..production()
    });
    let get = || request(Method::GET, "/api/items", "10.0.0.1").body(Body::empty()).unwrap();
    assert_eq!(prod.send(get()).await.status, StatusCode::OK);
    assert_eq!(prod.send(get()).await.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rejections_carry_headers() {
    let h = Harness::new(production());
    let res = h
        .send(
            request(Method::GET, "/api/items?path=../../etc/passwd", "10.0.0.1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.header("x-request-id").is_some());
    assert_eq!(res.header("x-frame-options"), Some("DENY"));
    assert!(res.header("strict-transport-security").is_some());
}

#[tokio::test]
async fn test_sweep_is_idempotent() {
    let h = Harness::new(GuardConfig::default());
    h.send(login("10.0.0.1", "wrong")).await;
    h.send(
        request(Method::GET, "/api/csrf-token", "10.0.0.1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert!(h.state.stats().rate_limit_entries > 0);

    h.clock.advance(Duration::from_secs(2 * 3600));
    let first = h.state.sweep();
    assert!(first.total() > 0);
    let second = h.state.sweep();
    assert_eq!(second.total(), 0);
    assert_eq!(h.state.stats().rate_limit_entries, 0);
    assert_eq!(h.state.stats().csrf_tokens, 0);
}

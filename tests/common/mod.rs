//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

use request_guard::config::{GuardConfig, GuardServiceConfig};
use request_guard::http::app::sample_app;
use request_guard::http::HttpServer;
use request_guard::security::{ManualClock, RecordingEventSink, SecurityState};

/// A guarded sample app with a manual clock and recorded security events.
pub struct Harness {
    pub state: Arc<SecurityState>,
    pub clock: Arc<ManualClock>,
    pub events: Arc<RecordingEventSink>,
    pub router: Router,
}

impl Harness {
    pub fn new(guard: GuardConfig) -> Self {
        let clock = Arc::new(ManualClock::new());
        let events = Arc::new(RecordingEventSink::new());
        let state = Arc::new(
            SecurityState::new(guard.clone())
                .with_clock(clock.clone())
                .with_event_sink(events.clone()),
        );
        let config = GuardServiceConfig { guard, ..GuardServiceConfig::default() };
        let server = HttpServer::with_state(config, sample_app(state.clone()), state.clone());
        Self {
            state,
            clock,
            events,
            router: server.router(),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        TestResponse { status, headers, json }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: serde_json::Value,
}

impl TestResponse {
    pub fn code(&self) -> Option<&str> {
        self.json["error"]["code"].as_str()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Request builder that looks like it arrived over TCP from `peer`.
pub fn request(method: Method, uri: &str, peer: &str) -> axum::http::request::Builder {
    let addr: SocketAddr = format!("{peer}:40000").parse().unwrap();
    Request::builder()
        .method(method)
        .uri(uri)
        .header("user-agent", "integration-test/1.0")
        .extension(ConnectInfo(addr))
}

pub fn json_body(value: serde_json::Value) -> Body {
    Body::from(value.to_string())
}

/// A login POST with a JSON body and matching content headers.
pub fn login(peer: &str, password: &str) -> Request<Body> {
    let body = serde_json::json!({ "username": "anna", "password": password }).to_string();
    request(Method::POST, "/api/auth/login", peer)
        .header("content-type", "application/json")
        .header("content-length", body.len().to_string())
        .body(Body::from(body))
        .unwrap()
}

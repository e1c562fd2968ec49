//! Sample application routes.
//!
//! A small API standing in for the protected application. It shows what
//! an application does on its side of the guards: bind a session after a
//! successful login, reset the login limiter, revoke the binding on
//! logout and hand out CSRF tokens.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::http::response::clear_cookie_value;
use crate::security::context::cookie_value;
use crate::security::{ClientIp, SecurityState};

/// Password accepted by the sample login.
pub const DEMO_PASSWORD: &str = "demo-password";

pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub fn sample_app(state: Arc<SecurityState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/whoami", get(whoami))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/csrf-token", get(csrf_token))
        .route("/api/items", get(list_items).post(create_item))
        .with_state(state)
}

fn session_id(state: &SecurityState, headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, &state.config().session_cookie)
}

fn failure(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "success": false, "error": { "code": code } }))).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn whoami(State(state): State<Arc<SecurityState>>, headers: HeaderMap) -> Json<serde_json::Value> {
    let authenticated = session_id(&state, &headers)
        .and_then(|id| state.session_binding(&id))
        .is_some();
    Json(json!({ "authenticated": authenticated }))
}

async fn login(
    State(state): State<Arc<SecurityState>>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Response {
    if body.username.is_empty() || body.password != DEMO_PASSWORD {
        return failure(StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS");
    }

    state.reset_login_attempts(&ip);
    let session = Uuid::new_v4().to_string();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    state.create_session_binding(&session, &ip, user_agent);

    let config = state.config();
    let cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
        config.session_cookie, session, config.session_ttl_secs
    );
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true, "user": body.username })),
    )
        .into_response()
}

async fn logout(State(state): State<Arc<SecurityState>>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&state, &headers) {
        state.remove_session_binding(&id);
    }
    let cookie = clear_cookie_value(&state.config().session_cookie);
    ([(header::SET_COOKIE, cookie)], Json(json!({ "success": true }))).into_response()
}

async fn csrf_token(State(state): State<Arc<SecurityState>>, headers: HeaderMap) -> Json<serde_json::Value> {
    let session = session_id(&state, &headers);
    let token = state.issue_csrf_token(session.as_deref());
    Json(json!({ "csrfToken": token }))
}

async fn list_items() -> Json<serde_json::Value> {
    Json(json!({ "items": [] }))
}

async fn create_item(
    State(state): State<Arc<SecurityState>>,
    headers: HeaderMap,
    Json(item): Json<serde_json::Value>,
) -> Response {
    let session = session_id(&state, &headers);
    let token_ok = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|token| state.verify_csrf_token(token, session.as_deref()));
    if !token_ok {
        return failure(StatusCode::FORBIDDEN, "CSRF_TOKEN_INVALID");
    }
    (StatusCode::CREATED, Json(json!({ "success": true, "item": item }))).into_response()
}

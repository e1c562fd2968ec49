//! Guard middleware.
//!
//! Builds a [`ClientContext`] from the incoming request, runs the guard
//! pipeline and either forwards the request or answers with the rejection.
//!
//! Bodies of state-changing requests on non-exempt paths are always
//! buffered and scanned, declared length or not. A body over
//! `max_body_bytes`, or one that fails mid-read, is rejected rather than
//! forwarded unscanned.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::GuardConfig;
use crate::http::request::RequestIdExt;
use crate::security::context::MSG_INVALID_REQUEST;
use crate::security::patterns::body_scan_exempt;
use crate::security::{client_ip, ClientContext, ClientIp, GuardOutcome, Rejection, RejectionCode, SecurityState};

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn should_buffer(config: &GuardConfig, ctx: &ClientContext) -> bool {
    !ctx.is_safe_method() && !body_scan_exempt(config, &ctx.path)
}

fn invalid_request() -> Response {
    Rejection::new(RejectionCode::InvalidRequest, MSG_INVALID_REQUEST).into_response()
}

pub async fn guard_middleware(
    State(state): State<Arc<SecurityState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let ip = client_ip(request.headers(), peer, config.trust_proxy);
    let request_id = request.request_id().unwrap_or("-").to_string();

    let uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let mut ctx = ClientContext::new(ip, request.method().clone(), uri);
    ctx.headers = request.headers().clone();

    let buffer = should_buffer(&config, &ctx);
    let (parts, body) = request.into_parts();
    let body = if buffer {
        if declared_length(&parts.headers).is_some_and(|len| len > config.max_body_bytes) {
            tracing::debug!(request_id = %request_id, path = %ctx.path, "Declared body exceeds scan limit");
            return invalid_request();
        }
        match axum::body::to_bytes(body, config.max_body_bytes).await {
            Ok(bytes) => {
                ctx.raw_body = Some(bytes.clone());
                Body::from(bytes)
            }
            // Over the limit while streaming, or a broken stream.
            Err(e) => {
                tracing::debug!(request_id = %request_id, path = %ctx.path, error = %e, "Request body unreadable");
                return invalid_request();
            }
        }
    } else {
        body
    };

    match state.evaluate(&ctx) {
        GuardOutcome::Continue => {
            let mut request = Request::from_parts(parts, body);
            request.extensions_mut().insert(ClientIp(ctx.ip));
            next.run(request).await
        }
        GuardOutcome::Reject(rejection) => {
            tracing::debug!(
                request_id = %request_id,
                code = %rejection.code,
                method = %ctx.method,
                path = %ctx.path,
                "Request rejected by guard"
            );
            rejection.into_response()
        }
    }
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::config::Environment;
use crate::security::{truncate_ip, StateStats, SweepReport};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub environment: Environment,
    pub csrf_enabled: bool,
    pub session_binding_enabled: bool,
    pub strict_session_binding: bool,
}

#[derive(Serialize)]
pub struct ResetResult {
    pub ip: String,
    pub reset: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let config = state.security.config();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        environment: config.environment,
        csrf_enabled: config.csrf_enabled,
        session_binding_enabled: config.session_binding_enabled,
        strict_session_binding: config.strict_session_binding,
    })
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<StateStats> {
    Json(state.security.stats())
}

pub async fn reset_login_attempts(
    State(state): State<AdminState>,
    Path(ip): Path<String>,
) -> Json<ResetResult> {
    let had_entry = state.security.login_attempts(&ip).is_some();
    state.security.reset_login_attempts(&ip);
    tracing::info!(ip = %truncate_ip(&ip), had_entry, "Login attempts reset by operator");
    Json(ResetResult { ip, reset: had_entry })
}

pub async fn revoke_session(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.security.remove_session_binding(&id) {
        tracing::info!("Session binding revoked by operator");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn run_sweep(State(state): State<AdminState>) -> Json<SweepReport> {
    Json(state.security.sweep())
}

#[cfg(test)]
mod tests {
    use crate::admin::{setup_admin_router, AdminState};
    use crate::config::{AdminConfig, GuardConfig};
    use crate::security::SecurityState;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn admin() -> (Arc<SecurityState>, axum::Router) {
        let security = Arc::new(SecurityState::new(GuardConfig::default()));
        let config = AdminConfig { api_key: "test-key".into(), ..AdminConfig::default() };
        let router = setup_admin_router(AdminState::new(security.clone(), &config));
        (security, router)
    }

    fn request(method: Method, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_key() {
        let (_, router) = admin();
        let missing = router.clone().oneshot(request(Method::GET, "/admin/status", None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = router.clone().oneshot(request(Method::GET, "/admin/status", Some("nope"))).await.unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = router.oneshot(request(Method::GET, "/admin/status", Some("test-key"))).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reset_login_attempts() {
        let (security, router) = admin();
        security.record_login_attempt("10.0.0.9");
        assert!(security.login_attempts("10.0.0.9").is_some());

        let response = router
            .oneshot(request(Method::POST, "/admin/login-attempts/10.0.0.9/reset", Some("test-key")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(security.login_attempts("10.0.0.9").is_none());
    }

    #[tokio::test]
    async fn test_revoke_session() {
        let (security, router) = admin();
        security.create_session_binding("sess-1", "10.0.0.1", "agent");

        let first = router
            .clone()
            .oneshot(request(Method::DELETE, "/admin/sessions/sess-1", Some("test-key")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::NO_CONTENT);

        let second = router
            .oneshot(request(Method::DELETE, "/admin/sessions/sess-1", Some("test-key")))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::NOT_FOUND);
    }
}

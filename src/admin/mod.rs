//! Operator API.
//!
//! Bearer-key protected routes for inspecting and nudging the guard state.
//! Served on its own bind address, never through the guarded router.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::config::AdminConfig;
use crate::http::server::ServerError;
use crate::lifecycle::shutdown::{wait, Shutdown};
use crate::security::SecurityState;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state of the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub security: Arc<SecurityState>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(security: Arc<SecurityState>, config: &AdminConfig) -> Self {
        Self {
            security,
            api_key: Arc::from(config.api_key.as_str()),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/login-attempts/{ip}/reset", post(reset_login_attempts))
        .route("/admin/sessions/{id}", delete(revoke_session))
        .route("/admin/sweep", post(run_sweep))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve_admin(config: &AdminConfig, state: AdminState, shutdown: &Shutdown) -> Result<(), ServerError> {
    let listener = crate::http::server::bind(&config.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(wait(shutdown.subscribe()))
        .await?;
    Ok(())
}

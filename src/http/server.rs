//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap an application router with the guard pipeline
//! - Wire up middleware (tracing, timeout, request ID, security headers)
//! - Bind server to listener with client address info
//! - Run the sweeper and apply config reloads while serving
//!
//! # Layer order (outermost first)
//! ```text
//! SetRequestId → Trace → PropagateRequestId → SecurityHeaders → Timeout → Guard → app
//! ```
//! Rejections therefore carry the request ID and the security headers.

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GuardServiceConfig;
use crate::http::middleware::guard_middleware;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::shutdown::{wait, Shutdown};
use crate::security::headers::security_headers_middleware;
use crate::security::{spawn_sweeper, SecurityHeaders, SecurityState};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Wrap `app` with the guard pipeline and the standard layer stack.
#[allow(deprecated)]
pub fn guarded_router(
    app: Router,
    state: Arc<SecurityState>,
    headers: SecurityHeaders,
    request_timeout: Duration,
) -> Router {
    app.layer(middleware::from_fn_with_state(state, guard_middleware))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn_with_state(headers, security_headers_middleware))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

/// Bind a TCP listener, mapping failures to [`ServerError::Bind`].
pub async fn bind(address: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(address).await.map_err(|source| ServerError::Bind {
        address: address.to_string(),
        source,
    })
}

/// HTTP server fronting an application with the request guards.
pub struct HttpServer {
    router: Router,
    state: Arc<SecurityState>,
    config: GuardServiceConfig,
}

impl HttpServer {
    /// Create a server with fresh guard state.
    pub fn new(config: GuardServiceConfig, app: Router) -> Self {
        let state = Arc::new(SecurityState::new(config.guard.clone()));
        Self::with_state(config, app, state)
    }

    /// Create a server around existing guard state (shared with the admin API).
    pub fn with_state(config: GuardServiceConfig, app: Router, state: Arc<SecurityState>) -> Self {
        let headers = SecurityHeaders::from_config(&config.headers, config.guard.is_production());
        let router = guarded_router(
            app,
            state.clone(),
            headers,
            Duration::from_secs(config.listener.request_timeout_secs),
        );
        Self { router, state, config }
    }

    pub fn state(&self) -> Arc<SecurityState> {
        self.state.clone()
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GuardServiceConfig {
        &self.config
    }

    /// Serve until `shutdown` fires.
    ///
    /// Configs arriving on `config_updates` swap the guard policy in
    /// place. Listener and header settings need a restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GuardServiceConfig>,
        shutdown: Shutdown,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = ?self.config.guard.environment,
            "HTTP server starting"
        );

        let sweeper = spawn_sweeper(self.state.clone(), shutdown.subscribe());

        let state = self.state.clone();
        let mut reload_shutdown = shutdown.subscribe();
        let reloader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => state.reload(config.guard),
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(wait(shutdown.subscribe()))
            .await;

        // The sweeper and the reloader also listen on `shutdown`; make sure
        // they stop even when serving ended on an error.
        shutdown.trigger();
        let _ = sweeper.await;
        let _ = reloader.await;

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

//! Request guard service.
//!
//! Fronts an axum application with the in-process request guards.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ SetRequestId → Trace → SecurityHeaders → Timeout
//!                         │
//!                         ▼
//!                   guard middleware ── ClientContext ──▶ Patterns → Csrf → AuthLimit
//!                         │                                 → GeneralLimit → Session
//!                         │                                        │
//!              Continue   ▼                           Reject       ▼
//!                   application router               JSON error envelope
//!
//!     Cross-cutting: config (TOML + env, hot reload), SecurityState
//!     (rate limits, CSRF tokens, session bindings), sweeper, metrics,
//!     admin API, lifecycle (signals → shutdown broadcast)
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use request_guard::admin::{serve_admin, AdminState};
use request_guard::config::watcher::ConfigWatcher;
use request_guard::config::{load_config, load_from_env};
use request_guard::http::app::sample_app;
use request_guard::http::server::{bind, HttpServer};
use request_guard::lifecycle::signals::spawn_signal_handler;
use request_guard::lifecycle::Shutdown;
use request_guard::observability::{logging, metrics};
use request_guard::security::SecurityState;

#[derive(Parser)]
#[command(name = "request-guard")]
#[command(about = "HTTP request guard service", long_about = None)]
struct Args {
    /// Optional TOML configuration file; watched for changes.
    #[arg(short, long, env = "GUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-guard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = ?config.guard.environment,
        csrf_enabled = config.guard.csrf_enabled,
        session_binding_enabled = config.guard.session_binding_enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path, config.clone());
            (Some(watcher.run()?), rx)
        }
        None => (None, tokio::sync::mpsc::unbounded_channel().1),
    };

    let state = Arc::new(SecurityState::new(config.guard.clone()));

    if config.admin.enabled {
        let admin_config = config.admin.clone();
        let admin_state = AdminState::new(state.clone(), &admin_config);
        let admin_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_admin(&admin_config, admin_state, &admin_shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = bind(&config.listener.bind_address).await?;
    let app = sample_app(state.clone());
    let server = HttpServer::with_state(config, app, state);
    server.run(listener, config_updates, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

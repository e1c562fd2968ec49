//! In-process request guards for axum services.
//!
//! Login throttling with exponential lockout, a per-address request cap,
//! an Origin/Referer CSRF check, session binding to client address and
//! user agent, and attack pattern detection, all backed by expiring
//! in-memory stores.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::{GuardConfig, GuardServiceConfig};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::SecurityState;

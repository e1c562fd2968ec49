//! Axum middleware wiring the guards into the request path.

pub mod guard;

pub use guard::guard_middleware;

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layer stack, connect info)
//!     → request.rs (request ID)
//!     → middleware/guard.rs (ClientContext → guard pipeline)
//!     → application router, or
//!     → response.rs (rejection envelope)
//!     → Send to client
//! ```

pub mod app;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{guarded_router, HttpServer, ServerError};

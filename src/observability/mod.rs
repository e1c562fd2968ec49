//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Guards and server produce:
//!     → logging.rs (structured log events, `security` target for events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON in production)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line via the trace layer
//! - Reporting never fails back into the request path

pub mod logging;
pub mod metrics;

//! Security subsystem: the request guard layer.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → patterns.rs (path traversal / SQLi / XSS signatures)
//!     → csrf.rs (Origin / Referer allow-list)
//!     → rate_limit.rs (auth lockout, then general per-minute cap)
//!     → session.rs (session id ↔ IP + User-Agent binding)
//!     → business logic
//!
//! Shared state:
//!     state.rs owns store.rs maps (rate limits, CSRF tokens, sessions)
//!     sweep.rs evicts stale records on an interval
//!     events.rs reports rejections and soft mismatches
//! ```
//!
//! # Design Decisions
//! - Guards are synchronous and never touch I/O
//! - A guard either continues or returns a terminal rejection; internal
//!   faults (bad headers, unparsable URLs) make a check inconclusive and
//!   the request continues
//! - Per-key updates are atomic under the store's shard lock

pub mod client_ip;
pub mod clock;
pub mod context;
pub mod csrf;
pub mod events;
pub mod headers;
pub mod patterns;
pub mod pipeline;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod store;
pub mod sweep;
pub mod token;

pub use client_ip::{client_ip, truncate_ip, ClientIp};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{ClientContext, GuardOutcome, Rejection, RejectionCode};
pub use events::{RecordingEventSink, SecurityEvent, SecurityEventKind, SecurityEventSink, TracingEventSink};
pub use headers::SecurityHeaders;
pub use pipeline::GuardStage;
pub use rate_limit::{LimitDecision, RateLimitEntry};
pub use session::SessionBinding;
pub use state::{SecurityState, StateStats};
pub use sweep::{spawn_sweeper, SweepReport, Sweeper};

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! guard.toml (optional)
//!     → loader.rs (parse & deserialize)
//!     → environment keys (NODE_ENV, MAX_LOGIN_ATTEMPTS, ...)
//!     → validation.rs (semantic checks)
//!     → GuardServiceConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → SecurityState swaps its GuardConfig atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Environment keys override the file
//! - Reloads swap policy only; counters and bindings survive

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    AdminConfig, Environment, GuardConfig, GuardServiceConfig, HeadersConfig, ListenerConfig,
    ObservabilityConfig,
};

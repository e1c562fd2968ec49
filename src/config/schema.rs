//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard
//! service. All types derive Serde traits for deserialization from config
//! files; environment keys are layered on top by the loader.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the guard service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardServiceConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Request guard policies.
    pub guard: GuardConfig,

    /// Response security headers.
    pub headers: HeadersConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Deployment environment. Gates the production-only behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
    Test,
}

impl Environment {
    /// Parse the `NODE_ENV`-style value. Unknown values fall back to
    /// development.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Policies for the request guard layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    pub environment: Environment,

    /// Auth limiter threshold.
    pub max_login_attempts: u32,

    /// Auth limiter window in milliseconds.
    pub rate_limit_window_ms: u64,

    /// General limiter threshold per minute.
    pub general_rate_limit: u32,

    /// Let GET requests past the general limiter outside production.
    pub dev_bypass_get: bool,

    /// Upper bound for a single lockout, in seconds.
    pub max_block_secs: u64,

    /// Exact paths guarded by the auth limiter.
    pub login_paths: Vec<String>,

    /// Paths never counted by the auth limiter.
    pub auth_excluded_paths: Vec<String>,

    /// Paths the general limiter ignores.
    pub general_skip_paths: Vec<String>,

    pub csrf_enabled: bool,

    /// Canonical application origin added to the CSRF allow-list.
    pub app_url: Option<String>,

    /// Extra origins allowed outside production.
    pub dev_origins: Vec<String>,

    /// Lifetime of issued CSRF tokens, in seconds.
    pub csrf_token_ttl_secs: u64,

    pub session_binding_enabled: bool,

    /// Reject instead of rebinding when a session changes IP or User-Agent.
    pub strict_session_binding: bool,

    /// Cookie carrying the session identifier.
    pub session_cookie: String,

    /// Lifetime of a session binding from its creation, in seconds.
    pub session_ttl_secs: u64,

    /// Trust `X-Forwarded-For` for the client address.
    pub trust_proxy: bool,

    /// Endpoints whose bodies legitimately carry HTML or scraped content.
    pub body_scan_exempt_paths: Vec<String>,

    /// Largest body buffered for inspection, in bytes.
    pub max_body_bytes: usize,

    /// Interval between sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            max_login_attempts: 5,
            rate_limit_window_ms: 15 * 60 * 1000,
            general_rate_limit: 100,
            dev_bypass_get: false,
            max_block_secs: 24 * 60 * 60,
            login_paths: vec![
                "/api/auth/login".to_string(),
                "/api/login".to_string(),
            ],
            auth_excluded_paths: vec![
                "/api/auth/register".to_string(),
                "/api/auth/forgot-password".to_string(),
                "/api/auth/reset-password".to_string(),
            ],
            general_skip_paths: vec![
                "/api/health".to_string(),
                "/api/auth/whoami".to_string(),
            ],
            csrf_enabled: true,
            app_url: None,
            dev_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            csrf_token_ttl_secs: 60 * 60,
            session_binding_enabled: true,
            strict_session_binding: false,
            session_cookie: "sessionId".to_string(),
            session_ttl_secs: 24 * 60 * 60,
            trust_proxy: false,
            body_scan_exempt_paths: vec![
                "/api/scrape".to_string(),
                "/api/products/import".to_string(),
                "/api/email/send".to_string(),
            ],
            max_body_bytes: 2 * 1024 * 1024,
            sweep_interval_secs: 5 * 60,
        }
    }
}

impl GuardConfig {
    pub fn auth_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn max_block(&self) -> Duration {
        Duration::from_secs(self.max_block_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn csrf_token_ttl(&self) -> Duration {
        Duration::from_secs(self.csrf_token_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }
}

/// Response security headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeadersConfig {
    /// Add the security header set to every response.
    pub enabled: bool,

    pub frame_options: String,

    pub content_security_policy: String,

    /// HSTS value, sent in production only.
    pub strict_transport_security: String,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_options: "DENY".to_string(),
            content_security_policy: "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data: https:; frame-ancestors 'none'".to_string(),
            strict_transport_security: "max-age=31536000; includeSubDomains".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

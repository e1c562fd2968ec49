//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, windows > 0)
//! - Check that URLs and addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{Environment, GuardServiceConfig};

/// A single semantic problem with a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is not a valid socket address: {value}")]
    BadAddress { field: &'static str, value: String },

    #[error("app_url is not an absolute http(s) URL: {0}")]
    BadAppUrl(String),

    #[error("{field} entry must start with '/': {value}")]
    BadPath { field: &'static str, value: String },

    #[error("admin api_key must be changed before enabling the admin API in production")]
    DefaultAdminKey,
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &GuardServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let guard = &config.guard;

    for (field, value) in [
        ("guard.max_login_attempts", guard.max_login_attempts as u64),
        ("guard.rate_limit_window_ms", guard.rate_limit_window_ms),
        ("guard.general_rate_limit", guard.general_rate_limit as u64),
        ("guard.max_block_secs", guard.max_block_secs),
        ("guard.session_ttl_secs", guard.session_ttl_secs),
        ("guard.csrf_token_ttl_secs", guard.csrf_token_ttl_secs),
        ("guard.sweep_interval_secs", guard.sweep_interval_secs),
        ("guard.max_body_bytes", guard.max_body_bytes as u64),
        ("listener.request_timeout_secs", config.listener.request_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if let Some(app_url) = &guard.app_url {
        let ok = url::Url::parse(app_url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
        if !ok {
            errors.push(ValidationError::BadAppUrl(app_url.clone()));
        }
    }

    for (field, paths) in [
        ("guard.login_paths", &guard.login_paths),
        ("guard.auth_excluded_paths", &guard.auth_excluded_paths),
        ("guard.general_skip_paths", &guard.general_skip_paths),
        ("guard.body_scan_exempt_paths", &guard.body_scan_exempt_paths),
    ] {
        for p in paths.iter().filter(|p| !p.starts_with('/')) {
            errors.push(ValidationError::BadPath { field, value: p.clone() });
        }
    }

    let mut addresses = vec![("listener.bind_address", &config.listener.bind_address)];
    if config.admin.enabled {
        addresses.push(("admin.bind_address", &config.admin.bind_address));
    }
    if config.observability.metrics_enabled {
        addresses.push(("observability.metrics_address", &config.observability.metrics_address));
    }
    for (field, value) in addresses {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::BadAddress { field, value: value.clone() });
        }
    }

    if config.admin.enabled
        && guard.environment == Environment::Production
        && config.admin.api_key == crate::config::schema::AdminConfig::default().api_key
    {
        errors.push(ValidationError::DefaultAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

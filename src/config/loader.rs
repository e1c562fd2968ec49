//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::config::schema::{Environment, GuardServiceConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value:?}")]
    Env { key: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, then apply the
/// process environment on top.
pub fn load_config(path: &Path) -> Result<GuardServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GuardServiceConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build configuration from defaults and the process environment only.
pub fn load_from_env() -> Result<GuardServiceConfig, ConfigError> {
    let mut config = GuardServiceConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply the environment keys the guard understands.
///
/// `lookup` abstracts the environment so callers can feed a fixed map.
pub fn apply_env_overrides<F>(config: &mut GuardServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let guard = &mut config.guard;

    if let Some(v) = lookup("NODE_ENV") {
        guard.environment = Environment::from_name(&v);
    }
    if let Some(v) = lookup("MAX_LOGIN_ATTEMPTS") {
        guard.max_login_attempts = parse_value("MAX_LOGIN_ATTEMPTS", &v)?;
    }
    if let Some(v) = lookup("RATE_LIMIT_WINDOW_MS") {
        guard.rate_limit_window_ms = parse_value("RATE_LIMIT_WINDOW_MS", &v)?;
    }
    if let Some(v) = lookup("GENERAL_RATE_LIMIT") {
        guard.general_rate_limit = parse_value("GENERAL_RATE_LIMIT", &v)?;
    }
    if let Some(v) = lookup("RATE_LIMIT_DEV_BYPASS_GET") {
        guard.dev_bypass_get = parse_flag("RATE_LIMIT_DEV_BYPASS_GET", &v)?;
    }
    if let Some(v) = lookup("SESSION_BINDING_ENABLED") {
        guard.session_binding_enabled = parse_flag("SESSION_BINDING_ENABLED", &v)?;
    }
    if let Some(v) = lookup("STRICT_SESSION_BINDING") {
        guard.strict_session_binding = parse_flag("STRICT_SESSION_BINDING", &v)?;
    }
    if let Some(v) = lookup("CSRF_ENABLED") {
        guard.csrf_enabled = parse_flag("CSRF_ENABLED", &v)?;
    }
    if let Some(v) = lookup("TRUST_PROXY") {
        guard.trust_proxy = parse_flag("TRUST_PROXY", &v)?;
    }
    if let Some(v) = lookup("APP_URL") {
        let v = v.trim();
        guard.app_url = (!v.is_empty()).then(|| v.to_string());
    }

    if guard.environment.is_production() {
        config.observability.json_logs = true;
    }

    Ok(())
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key,
        value: value.to_string(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            key,
            value: value.to_string(),
        }),
    }
}

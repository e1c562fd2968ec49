//! Hot reload of guard policies from the config file.
//!
//! Only the `[guard]` section is applied to a running service. Edits to the
//! listener, admin, headers or observability sections are reported and take
//! effect on the next start.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GuardServiceConfig;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Reloads the config file on change and forwards revisions that touch
/// guard policies.
pub struct ConfigWatcher {
    path: PathBuf,
    current: GuardServiceConfig,
    updates: mpsc::UnboundedSender<GuardServiceConfig>,
}

impl ConfigWatcher {
    /// `current` is the configuration the service started with; later
    /// revisions are diffed against the last one loaded.
    pub fn new(
        path: &Path,
        current: GuardServiceConfig,
    ) -> (Self, mpsc::UnboundedReceiver<GuardServiceConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            current,
            updates,
        };
        (watcher, rx)
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(mut self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    self.reload();
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Watching guard configuration");
        Ok(watcher)
    }

    /// Load the file and forward it when any guard policy changed.
    /// Returns every field that differs from the previous revision.
    fn reload(&mut self) -> Vec<String> {
        let next = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = ?self.path,
                    error = %e,
                    "Rejected configuration change, keeping current policies"
                );
                return Vec::new();
            }
        };

        let changed = changed_fields(&self.current, &next);
        if changed.is_empty() {
            tracing::debug!(path = ?self.path, "Config file rewritten without changes");
            return changed;
        }

        let (live, on_restart): (Vec<&String>, Vec<&String>) =
            changed.iter().partition(|f| f.starts_with("guard."));
        if !on_restart.is_empty() {
            tracing::warn!(fields = ?on_restart, "Settings changed that apply on restart");
        }
        if !live.is_empty() {
            tracing::info!(fields = ?live, "Guard policies reloaded");
            if self.updates.send(next.clone()).is_err() {
                tracing::debug!("Config receiver gone, reload dropped");
            }
        }

        self.current = next;
        changed
    }
}

/// Dotted `section.field` names whose values differ between two configs.
pub fn changed_fields(old: &GuardServiceConfig, new: &GuardServiceConfig) -> Vec<String> {
    let (Ok(old), Ok(new)) = (serde_json::to_value(old), serde_json::to_value(new)) else {
        return Vec::new();
    };
    let mut changed = Vec::new();
    collect_changes("", &old, &new, &mut changed);
    changed
}

fn collect_changes(prefix: &str, old: &Value, new: &Value, out: &mut Vec<String>) {
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, before) in old {
                let field = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match new.get(key) {
                    Some(after) => collect_changes(&field, before, after, out),
                    None => out.push(field),
                }
            }
        }
        _ if old != new => out.push(prefix.to_string()),
        _ => {}
    }
}

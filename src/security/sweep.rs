//! Periodic eviction of stale guard records.
//!
//! # Responsibilities
//! - Drop limiter entries older than twice their window
//! - Drop CSRF tokens past their expiry
//! - Drop session bindings past their lifetime (from creation)
//!
//! # Design Decisions
//! - Runs on a tokio task, stopped by the shutdown broadcast
//! - The interval is re-read each round so policy reloads apply
//! - Sweeping is lazy: a record may outlive its expiry by one interval

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::security::state::SecurityState;

/// Records evicted by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub rate_limits: usize,
    pub csrf_tokens: usize,
    pub sessions: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.rate_limits + self.csrf_tokens + self.sessions
    }
}

impl SecurityState {
    /// Evict every expired record now.
    pub fn sweep(&self) -> SweepReport {
        let now = self.now();
        let report = SweepReport {
            rate_limits: self.sweep_rate_limits(now),
            csrf_tokens: self.sweep_csrf_tokens(now),
            sessions: self.sweep_sessions(now),
        };

        metrics::record_sweep(self.rate_limits.name(), report.rate_limits, self.rate_limits.len());
        metrics::record_sweep(self.csrf_tokens.name(), report.csrf_tokens, self.csrf_tokens.len());
        metrics::record_sweep(self.sessions.name(), report.sessions, self.sessions.len());

        if report.total() > 0 {
            tracing::debug!(
                rate_limits = report.rate_limits,
                csrf_tokens = report.csrf_tokens,
                sessions = report.sessions,
                "Swept expired guard records"
            );
        }
        report
    }
}

/// Background task that sweeps the state on an interval.
pub struct Sweeper {
    state: Arc<SecurityState>,
}

impl Sweeper {
    pub fn new(state: Arc<SecurityState>) -> Self {
        Self { state }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.state.config().sweep_interval_secs,
            "Guard sweeper starting"
        );

        loop {
            let interval = self.state.config().sweep_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.state.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Guard sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Spawn the sweeper on the current runtime.
pub fn spawn_sweeper(state: Arc<SecurityState>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(Sweeper::new(state).run(shutdown))
}

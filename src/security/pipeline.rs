//! Guard ordering.

use crate::observability::metrics;
use crate::security::context::{ClientContext, GuardOutcome};
use crate::security::state::SecurityState;

/// Guard stages in the order a request meets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStage {
    Patterns,
    Csrf,
    AuthLimit,
    GeneralLimit,
    Session,
}

impl GuardStage {
    pub const ORDER: [GuardStage; 5] = [
        GuardStage::Patterns,
        GuardStage::Csrf,
        GuardStage::AuthLimit,
        GuardStage::GeneralLimit,
        GuardStage::Session,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GuardStage::Patterns => "patterns",
            GuardStage::Csrf => "csrf",
            GuardStage::AuthLimit => "auth_limit",
            GuardStage::GeneralLimit => "general_limit",
            GuardStage::Session => "session",
        }
    }

    fn run(self, state: &SecurityState, ctx: &ClientContext) -> GuardOutcome {
        match self {
            GuardStage::Patterns => state.inspect_patterns(ctx),
            GuardStage::Csrf => state.check_csrf(ctx),
            GuardStage::AuthLimit => state.check_auth_limit(ctx),
            GuardStage::GeneralLimit => state.check_general_limit(ctx),
            GuardStage::Session => state.check_session(ctx),
        }
    }
}

impl SecurityState {
    /// Run every guard in order. The first rejection ends the pipeline and
    /// later guards never see the request.
    pub fn evaluate(&self, ctx: &ClientContext) -> GuardOutcome {
        for stage in GuardStage::ORDER {
            if let GuardOutcome::Reject(rejection) = stage.run(self, ctx) {
                tracing::debug!(
                    stage = stage.as_str(),
                    code = rejection.code.as_str(),
                    method = %ctx.method,
                    path = %ctx.path,
                    "Request rejected"
                );
                metrics::record_rejection(rejection.code.as_str(), stage.as_str());
                return GuardOutcome::Reject(rejection);
            }
        }
        GuardOutcome::Continue
    }
}

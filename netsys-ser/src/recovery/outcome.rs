//! Run outcomes and reports.

use super::request::{RecoveryRequest, RecoveryScope};
use super::state::RecoveryState;
use crate::port::{PortError, ResetTier};
use crate::rendezvous::RendezvousError;
use std::time::Duration;
use thiserror::Error;

/// Why a run failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FailureReason {
    /// The configuration snapshot could not be taken; nothing was touched.
    #[error("configuration snapshot capture failed: {0}")]
    SnapshotCapture(#[source] PortError),

    /// Not even the cold reset reported completion.
    #[error("cold reset did not complete; hardware presumed non-functional")]
    ColdResetTimeout,

    /// A register operation failed after the snapshot was taken.
    #[error("register operation failed while {state}: {source}")]
    Port {
        state: RecoveryState,
        #[source]
        source: PortError,
    },

    /// The rendezvous barrier refused to open a phase.
    #[error("rendezvous error: {0}")]
    Rendezvous(#[from] RendezvousError),
}

/// Result of one recovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Succeeded,
    /// The engine is back but something along the way was forced through.
    SucceededAfterEscalation {
        escalations: u32,
        config_mismatch: bool,
    },
    Failed(FailureReason),
}

impl RecoveryOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, RecoveryOutcome::Failed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryOutcome::Succeeded => "succeeded",
            RecoveryOutcome::SucceededAfterEscalation { .. } => "succeeded_after_escalation",
            RecoveryOutcome::Failed(_) => "failed",
        }
    }
}

/// Per-run statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub warm_reset_attempts: u32,
    pub cold_reset_escalations: u32,
    pub stop_timeouts: u32,
    pub resume_timeouts: u32,
    pub stop_failures: u32,
    pub resume_failures: u32,
    /// Phases that proceeded without every accelerator acknowledging.
    pub rendezvous_escalations: u32,
    pub drain_timed_out: bool,
    pub offload_idle_timeouts: u32,
    /// Scope or tier raised by a later request or a stop failure.
    pub scope_upgraded: bool,
    pub config_mismatch: bool,
}

impl RunStats {
    /// Escalations that make a successful run `SucceededAfterEscalation`.
    pub fn escalations(&self) -> u32 {
        self.rendezvous_escalations + self.cold_reset_escalations
    }
}

/// Emitted once per run, when the orchestrator returns to `Idle`.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub request: RecoveryRequest,
    /// Scope after any upgrades.
    pub scope: RecoveryScope,
    /// Last reset tier issued, if the run got that far.
    pub reset_tier: Option<ResetTier>,
    pub outcome: RecoveryOutcome,
    pub stats: RunStats,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalations_sum() {
        let stats = RunStats {
            rendezvous_escalations: 2,
            cold_reset_escalations: 1,
            stop_timeouts: 3,
            ..Default::default()
        };
        assert_eq!(stats.escalations(), 3);
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::Port {
            state: RecoveryState::Reattaching,
            source: PortError::Unavailable("gmac1".to_string()),
        };
        assert_eq!(
            reason.to_string(),
            "register operation failed while reattaching: hardware unavailable: gmac1"
        );
        assert!(!RecoveryOutcome::Failed(reason).is_success());
    }
}

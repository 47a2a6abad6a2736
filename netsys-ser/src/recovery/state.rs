//! Orchestrator states.

use std::fmt;

/// Where the orchestrator is in a recovery run.
///
/// ```text
/// Idle -> Quiescing -> ExternalStop -> Resetting -> ExternalResume -> Reattaching -> Idle
///              \             \             \               \               \
///               +-------------+-------------+---------------+---------------+--> Aborting -> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecoveryState {
    #[default]
    Idle,
    /// Snapshot taken, ports closed, queues draining.
    Quiescing,
    /// DMA and interrupts off, accelerators asked to stop.
    ExternalStop,
    /// Engine in reset; register access is exclusive.
    Resetting,
    /// Engine back, accelerators asked to resume.
    ExternalResume,
    /// Configuration restored, ports reopened, detectors rearmed.
    Reattaching,
    /// Unrecoverable failure being unwound.
    Aborting,
}

impl RecoveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryState::Idle => "idle",
            RecoveryState::Quiescing => "quiescing",
            RecoveryState::ExternalStop => "external_stop",
            RecoveryState::Resetting => "resetting",
            RecoveryState::ExternalResume => "external_resume",
            RecoveryState::Reattaching => "reattaching",
            RecoveryState::Aborting => "aborting",
        }
    }

    /// True for every state other than `Idle`.
    pub fn is_active(&self) -> bool {
        *self != RecoveryState::Idle
    }
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

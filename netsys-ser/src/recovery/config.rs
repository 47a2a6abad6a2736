//! Recovery orchestrator configuration.

use std::time::Duration;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Longest wait for the output queues to drain before proceeding anyway.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Output queue poll interval while draining.
pub const DEFAULT_DRAIN_POLL: Duration = Duration::from_millis(1);

/// Budget for the warm reset's completion bit.
pub const DEFAULT_WARM_RESET_TIMEOUT: Duration = Duration::from_secs(1);

/// Budget for the cold reset's completion bit.
pub const DEFAULT_COLD_RESET_TIMEOUT: Duration = Duration::from_secs(1);

/// Reset completion poll interval.
pub const DEFAULT_RESET_POLL: Duration = Duration::from_millis(1);

/// Longest wait for a flow-offload engine to go idle.
pub const DEFAULT_OFFLOAD_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Flow-offload idle poll interval.
pub const DEFAULT_OFFLOAD_POLL: Duration = Duration::from_millis(1);

/// Wait for accelerators to acknowledge the stop phase.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Wait for accelerators to acknowledge the resume phase.
pub const DEFAULT_RESUME_TIMEOUT: Duration = Duration::from_secs(3);

/// Re-broadcasts of a timed-out phase before proceeding without it.
pub const RENDEZVOUS_RETRY_LIMIT: u32 = 1;

/// Capacity of the recovery report broadcast channel.
pub const REPORT_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Recovery Configuration
// =============================================================================

/// Timeouts and poll intervals for one recovery run.
///
/// Every wait in a run is bounded by one of these timeouts plus at most one
/// poll interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryConfig {
    pub drain_timeout: Duration,
    pub drain_poll: Duration,
    pub warm_reset_timeout: Duration,
    pub cold_reset_timeout: Duration,
    pub reset_poll: Duration,
    pub offload_idle_timeout: Duration,
    pub offload_poll: Duration,
    pub stop_timeout: Duration,
    pub resume_timeout: Duration,
    pub rendezvous_retry_limit: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            drain_poll: DEFAULT_DRAIN_POLL,
            warm_reset_timeout: DEFAULT_WARM_RESET_TIMEOUT,
            cold_reset_timeout: DEFAULT_COLD_RESET_TIMEOUT,
            reset_poll: DEFAULT_RESET_POLL,
            offload_idle_timeout: DEFAULT_OFFLOAD_IDLE_TIMEOUT,
            offload_poll: DEFAULT_OFFLOAD_POLL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            resume_timeout: DEFAULT_RESUME_TIMEOUT,
            rendezvous_retry_limit: RENDEZVOUS_RETRY_LIMIT,
        }
    }
}

impl RecoveryConfig {
    pub fn with_drain(mut self, timeout: Duration, poll: Duration) -> Self {
        self.drain_timeout = timeout;
        self.drain_poll = poll;
        self
    }

    pub fn with_reset_timeouts(mut self, warm: Duration, cold: Duration) -> Self {
        self.warm_reset_timeout = warm;
        self.cold_reset_timeout = cold;
        self
    }

    pub fn with_reset_poll(mut self, poll: Duration) -> Self {
        self.reset_poll = poll;
        self
    }

    pub fn with_offload_idle(mut self, timeout: Duration, poll: Duration) -> Self {
        self.offload_idle_timeout = timeout;
        self.offload_poll = poll;
        self
    }

    pub fn with_rendezvous_timeouts(mut self, stop: Duration, resume: Duration) -> Self {
        self.stop_timeout = stop;
        self.resume_timeout = resume;
        self
    }
}

impl From<&crate::config::ConfigFile> for RecoveryConfig {
    fn from(config: &crate::config::ConfigFile) -> Self {
        let recovery = &config.recovery;
        let rendezvous = &config.rendezvous;
        Self {
            drain_timeout: Duration::from_millis(recovery.drain_timeout_ms),
            drain_poll: Duration::from_millis(recovery.drain_poll_ms),
            warm_reset_timeout: Duration::from_millis(recovery.warm_reset_timeout_ms),
            cold_reset_timeout: Duration::from_millis(recovery.cold_reset_timeout_ms),
            reset_poll: Duration::from_millis(recovery.reset_poll_ms),
            offload_idle_timeout: Duration::from_millis(recovery.offload_idle_timeout_ms),
            offload_poll: Duration::from_millis(recovery.offload_poll_ms),
            stop_timeout: Duration::from_millis(rendezvous.stop_timeout_ms),
            resume_timeout: Duration::from_millis(rendezvous.resume_timeout_ms),
            rendezvous_retry_limit: RENDEZVOUS_RETRY_LIMIT,
        }
    }
}

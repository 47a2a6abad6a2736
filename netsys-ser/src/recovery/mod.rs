//! Recovery orchestration.
//!
//! Requests from the hang monitor and the control surface pass through a
//! [`RecoveryLock`] so that at most one run is in flight. The
//! [`RecoveryOrchestrator`] drives each run through its states, applies
//! escalations at state boundaries, and publishes a [`RecoveryReport`]
//! when the run finishes.

mod config;
mod counters;
mod lock;
mod orchestrator;
mod outcome;
mod request;
mod state;

pub use config::{
    RecoveryConfig, DEFAULT_COLD_RESET_TIMEOUT, DEFAULT_DRAIN_POLL, DEFAULT_DRAIN_TIMEOUT,
    DEFAULT_OFFLOAD_IDLE_TIMEOUT, DEFAULT_OFFLOAD_POLL, DEFAULT_RESET_POLL,
    DEFAULT_RESUME_TIMEOUT, DEFAULT_STOP_TIMEOUT, DEFAULT_WARM_RESET_TIMEOUT,
    RENDEZVOUS_RETRY_LIMIT, REPORT_CHANNEL_CAPACITY,
};
pub use counters::{CountersSnapshot, RecoveryCounters};
pub use lock::{RecoveryLock, RecoveryLockGuard, Submission, Upgrade};
pub use orchestrator::RecoveryOrchestrator;
pub use outcome::{FailureReason, RecoveryOutcome, RecoveryReport, RunStats};
pub use request::{RecoveryCause, RecoveryRequest, RecoveryScope};
pub use state::RecoveryState;

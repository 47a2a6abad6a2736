//! Default values and constants for all configuration settings.
//!
//! Timing defaults are derived from the component constants so that a
//! default `ConfigFile` builds exactly the default component configs.

use std::path::PathBuf;

use super::file::config_directory;
use super::settings::*;
use crate::control::{AutoRecovery, DiagnosticsVerbosity};
use crate::datapath::HANG_THRESHOLD;
use crate::monitor::DEFAULT_TICK_INTERVAL;
use crate::recovery;

// =============================================================================
// Monitor
// =============================================================================

pub const DEFAULT_TICK_INTERVAL_MS: u64 = DEFAULT_TICK_INTERVAL.as_millis() as u64;
pub const DEFAULT_HANG_THRESHOLD: u32 = HANG_THRESHOLD;

// =============================================================================
// Recovery
// =============================================================================

pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = recovery::DEFAULT_DRAIN_TIMEOUT.as_millis() as u64;
pub const DEFAULT_DRAIN_POLL_MS: u64 = recovery::DEFAULT_DRAIN_POLL.as_millis() as u64;
pub const DEFAULT_WARM_RESET_TIMEOUT_MS: u64 =
    recovery::DEFAULT_WARM_RESET_TIMEOUT.as_millis() as u64;
pub const DEFAULT_COLD_RESET_TIMEOUT_MS: u64 =
    recovery::DEFAULT_COLD_RESET_TIMEOUT.as_millis() as u64;
pub const DEFAULT_RESET_POLL_MS: u64 = recovery::DEFAULT_RESET_POLL.as_millis() as u64;
pub const DEFAULT_OFFLOAD_IDLE_TIMEOUT_MS: u64 =
    recovery::DEFAULT_OFFLOAD_IDLE_TIMEOUT.as_millis() as u64;
pub const DEFAULT_OFFLOAD_POLL_MS: u64 = recovery::DEFAULT_OFFLOAD_POLL.as_millis() as u64;

// =============================================================================
// Rendezvous
// =============================================================================

pub const DEFAULT_STOP_TIMEOUT_MS: u64 = recovery::DEFAULT_STOP_TIMEOUT.as_millis() as u64;
pub const DEFAULT_RESUME_TIMEOUT_MS: u64 = recovery::DEFAULT_RESUME_TIMEOUT.as_millis() as u64;

// =============================================================================
// Logging
// =============================================================================

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "netsys-ser.log";

/// Default log directory (~/.netsys-ser/logs).
pub fn default_log_directory() -> PathBuf {
    config_directory().join("logs")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            monitor: MonitorSettings {
                tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
                hang_threshold: DEFAULT_HANG_THRESHOLD,
                disabled_datapaths: Vec::new(),
                auto_recovery: AutoRecovery::default(),
            },
            recovery: RecoverySettings {
                drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
                drain_poll_ms: DEFAULT_DRAIN_POLL_MS,
                warm_reset_timeout_ms: DEFAULT_WARM_RESET_TIMEOUT_MS,
                cold_reset_timeout_ms: DEFAULT_COLD_RESET_TIMEOUT_MS,
                reset_poll_ms: DEFAULT_RESET_POLL_MS,
                offload_idle_timeout_ms: DEFAULT_OFFLOAD_IDLE_TIMEOUT_MS,
                offload_poll_ms: DEFAULT_OFFLOAD_POLL_MS,
            },
            rendezvous: RendezvousSettings {
                stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
                resume_timeout_ms: DEFAULT_RESUME_TIMEOUT_MS,
            },
            logging: LoggingSettings {
                directory: default_log_directory(),
                file: DEFAULT_LOG_FILE.to_string(),
                diagnostics: DiagnosticsVerbosity::default(),
            },
        }
    }
}

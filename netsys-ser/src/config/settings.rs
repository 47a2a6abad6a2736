//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use crate::control::{AutoRecovery, DiagnosticsVerbosity};
use crate::datapath::DatapathId;
use std::path::PathBuf;

/// Complete controller configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Hang monitor settings
    pub monitor: MonitorSettings,
    /// Recovery run timeouts and poll intervals
    pub recovery: RecoverySettings,
    /// Accelerator rendezvous timeouts
    pub rendezvous: RendezvousSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Hang monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Interval between detector samples in milliseconds
    pub tick_interval_ms: u64,
    /// Consecutive stale ticks before a hang is confirmed
    pub hang_threshold: u32,
    /// Datapaths excluded from hang detection
    pub disabled_datapaths: Vec<DatapathId>,
    /// Initial auto-recovery policy
    pub auto_recovery: AutoRecovery,
}

/// Recovery run configuration. All values in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverySettings {
    pub drain_timeout_ms: u64,
    pub drain_poll_ms: u64,
    pub warm_reset_timeout_ms: u64,
    pub cold_reset_timeout_ms: u64,
    pub reset_poll_ms: u64,
    pub offload_idle_timeout_ms: u64,
    pub offload_poll_ms: u64,
}

/// Accelerator rendezvous configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousSettings {
    /// Wait for stop acknowledgements in milliseconds
    pub stop_timeout_ms: u64,
    /// Wait for resume acknowledgements in milliseconds
    pub resume_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Directory the log file is written to
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
    /// Initial diagnostics verbosity
    pub diagnostics: DiagnosticsVerbosity,
}

//! Operator control surface.
//!
//! Holds the auto-recovery policy and diagnostics verbosity, and decodes the
//! numeric operator levels accepted by the reset control entry point.

use crate::recovery::RecoveryScope;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;

// =============================================================================
// Policy values
// =============================================================================

/// Whether confirmed hangs start recovery runs on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoRecovery {
    /// Hangs are logged only.
    Disabled,
    /// Every confirmed hang submits a request.
    #[default]
    Enabled,
    /// The next confirmed hang submits a request, then the policy reverts
    /// to `Disabled`.
    ArmedOnce,
}

impl AutoRecovery {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoRecovery::Disabled => "disabled",
            AutoRecovery::Enabled => "enabled",
            AutoRecovery::ArmedOnce => "once",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            AutoRecovery::Disabled => 0,
            AutoRecovery::Enabled => 1,
            AutoRecovery::ArmedOnce => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => AutoRecovery::Enabled,
            2 => AutoRecovery::ArmedOnce,
            _ => AutoRecovery::Disabled,
        }
    }
}

impl fmt::Display for AutoRecovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutoRecovery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" | "off" | "false" => Ok(AutoRecovery::Disabled),
            "enabled" | "on" | "true" => Ok(AutoRecovery::Enabled),
            "once" | "armed_once" => Ok(AutoRecovery::ArmedOnce),
            other => Err(format!("unknown auto-recovery mode '{other}'")),
        }
    }
}

/// How much the controller dumps when a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagnosticsVerbosity {
    #[default]
    Quiet,
    /// Request a register dump from the port at the start of every run.
    Dump,
}

impl DiagnosticsVerbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticsVerbosity::Quiet => "quiet",
            DiagnosticsVerbosity::Dump => "dump",
        }
    }
}

impl fmt::Display for DiagnosticsVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagnosticsVerbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quiet" => Ok(DiagnosticsVerbosity::Quiet),
            "dump" => Ok(DiagnosticsVerbosity::Dump),
            other => Err(format!("unknown diagnostics verbosity '{other}'")),
        }
    }
}

// =============================================================================
// ControlSurface
// =============================================================================

/// Shared, lock-free policy state.
#[derive(Debug)]
pub struct ControlSurface {
    auto_recovery: AtomicU8,
    dump: AtomicU8,
}

impl ControlSurface {
    pub fn new(auto_recovery: AutoRecovery, verbosity: DiagnosticsVerbosity) -> Self {
        Self {
            auto_recovery: AtomicU8::new(auto_recovery.to_u8()),
            dump: AtomicU8::new(u8::from(verbosity == DiagnosticsVerbosity::Dump)),
        }
    }

    pub fn auto_recovery(&self) -> AutoRecovery {
        AutoRecovery::from_u8(self.auto_recovery.load(Ordering::Acquire))
    }

    pub fn set_auto_recovery(&self, mode: AutoRecovery) {
        self.auto_recovery.store(mode.to_u8(), Ordering::Release);
    }

    pub fn verbosity(&self) -> DiagnosticsVerbosity {
        if self.dump.load(Ordering::Acquire) != 0 {
            DiagnosticsVerbosity::Dump
        } else {
            DiagnosticsVerbosity::Quiet
        }
    }

    pub fn set_verbosity(&self, verbosity: DiagnosticsVerbosity) {
        self.dump.store(
            u8::from(verbosity == DiagnosticsVerbosity::Dump),
            Ordering::Release,
        );
    }

    /// Decides whether a confirmed hang may submit a request.
    ///
    /// `ArmedOnce` is consumed atomically: of several concurrent callers at
    /// most one sees `true`.
    pub fn take_auto_permit(&self) -> bool {
        match self.auto_recovery() {
            AutoRecovery::Enabled => true,
            AutoRecovery::Disabled => false,
            AutoRecovery::ArmedOnce => self
                .auto_recovery
                .compare_exchange(
                    AutoRecovery::ArmedOnce.to_u8(),
                    AutoRecovery::Disabled.to_u8(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok(),
        }
    }
}

impl Default for ControlSurface {
    fn default() -> Self {
        Self::new(AutoRecovery::default(), DiagnosticsVerbosity::default())
    }
}

// =============================================================================
// Operator commands
// =============================================================================

/// Error decoding an operator level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("unknown control level {0} (expected 0-7)")]
    UnknownLevel(u8),
}

/// A decoded operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    SetAutoRecovery(AutoRecovery),
    SetVerbosity(DiagnosticsVerbosity),
    RequestRecovery {
        scope: RecoveryScope,
        cold_reset: bool,
    },
}

impl ControlCommand {
    /// Decodes an operator level.
    ///
    /// | level | command |
    /// |---|---|
    /// | 0 | disable auto-recovery |
    /// | 1 | full reset, warm first |
    /// | 2 | enable auto-recovery |
    /// | 3 | stop traffic, warm first |
    /// | 4 | diagnostics dump on |
    /// | 5 | diagnostics dump off |
    /// | 6 | full reset, cold |
    /// | 7 | stop traffic, cold |
    pub fn from_level(level: u8) -> Result<Self, ControlError> {
        let command = match level {
            0 => ControlCommand::SetAutoRecovery(AutoRecovery::Disabled),
            1 => ControlCommand::RequestRecovery {
                scope: RecoveryScope::FullReset,
                cold_reset: false,
            },
            2 => ControlCommand::SetAutoRecovery(AutoRecovery::Enabled),
            3 => ControlCommand::RequestRecovery {
                scope: RecoveryScope::StopTraffic,
                cold_reset: false,
            },
            4 => ControlCommand::SetVerbosity(DiagnosticsVerbosity::Dump),
            5 => ControlCommand::SetVerbosity(DiagnosticsVerbosity::Quiet),
            6 => ControlCommand::RequestRecovery {
                scope: RecoveryScope::FullReset,
                cold_reset: true,
            },
            7 => ControlCommand::RequestRecovery {
                scope: RecoveryScope::StopTraffic,
                cold_reset: true,
            },
            other => return Err(ControlError::UnknownLevel(other)),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_surface() {
        let control = ControlSurface::default();
        assert_eq!(control.auto_recovery(), AutoRecovery::Enabled);
        assert_eq!(control.verbosity(), DiagnosticsVerbosity::Quiet);
    }

    #[test]
    fn test_armed_once_is_consumed() {
        let control = ControlSurface::new(AutoRecovery::ArmedOnce, DiagnosticsVerbosity::Quiet);
        assert!(control.take_auto_permit());
        assert_eq!(control.auto_recovery(), AutoRecovery::Disabled);
        assert!(!control.take_auto_permit());
    }

    #[test]
    fn test_enabled_permits_repeatedly() {
        let control = ControlSurface::default();
        assert!(control.take_auto_permit());
        assert!(control.take_auto_permit());
        assert_eq!(control.auto_recovery(), AutoRecovery::Enabled);
    }

    #[test]
    fn test_verbosity_toggle() {
        let control = ControlSurface::default();
        control.set_verbosity(DiagnosticsVerbosity::Dump);
        assert_eq!(control.verbosity(), DiagnosticsVerbosity::Dump);
        control.set_verbosity(DiagnosticsVerbosity::Quiet);
        assert_eq!(control.verbosity(), DiagnosticsVerbosity::Quiet);
    }

    #[test]
    fn test_levels_decode() {
        assert_eq!(
            ControlCommand::from_level(0),
            Ok(ControlCommand::SetAutoRecovery(AutoRecovery::Disabled))
        );
        assert_eq!(
            ControlCommand::from_level(6),
            Ok(ControlCommand::RequestRecovery {
                scope: RecoveryScope::FullReset,
                cold_reset: true
            })
        );
        assert_eq!(
            ControlCommand::from_level(3),
            Ok(ControlCommand::RequestRecovery {
                scope: RecoveryScope::StopTraffic,
                cold_reset: false
            })
        );
        assert_eq!(
            ControlCommand::from_level(8),
            Err(ControlError::UnknownLevel(8))
        );
    }

    #[test]
    fn test_auto_recovery_parse() {
        assert_eq!("once".parse::<AutoRecovery>(), Ok(AutoRecovery::ArmedOnce));
        assert_eq!(" Enabled ".parse::<AutoRecovery>(), Ok(AutoRecovery::Enabled));
        assert!("sometimes".parse::<AutoRecovery>().is_err());
    }
}

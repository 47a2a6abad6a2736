//! Service configuration.

use crate::control::{AutoRecovery, DiagnosticsVerbosity};
use crate::monitor::MonitorConfig;
use crate::recovery::RecoveryConfig;

/// Everything the service needs to wire its components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    pub monitor: MonitorConfig,
    pub recovery: RecoveryConfig,
    /// Auto-recovery policy at start.
    pub auto_recovery: AutoRecovery,
    /// Diagnostics verbosity at start.
    pub verbosity: DiagnosticsVerbosity,
}

impl ServiceConfig {
    pub fn with_monitor(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_auto_recovery(mut self, mode: AutoRecovery) -> Self {
        self.auto_recovery = mode;
        self
    }

    pub fn with_verbosity(mut self, verbosity: DiagnosticsVerbosity) -> Self {
        self.verbosity = verbosity;
        self
    }
}

impl From<&crate::config::ConfigFile> for ServiceConfig {
    fn from(config: &crate::config::ConfigFile) -> Self {
        Self {
            monitor: MonitorConfig::from(config),
            recovery: RecoveryConfig::from(config),
            auto_recovery: config.monitor.auto_recovery,
            verbosity: config.logging.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;

    #[test]
    fn test_from_default_file_matches_default() {
        assert_eq!(ServiceConfig::from(&ConfigFile::default()), ServiceConfig::default());
    }

    #[test]
    fn test_policy_carried_from_file() {
        let mut file = ConfigFile::default();
        file.monitor.auto_recovery = AutoRecovery::ArmedOnce;
        file.logging.diagnostics = DiagnosticsVerbosity::Dump;

        let config = ServiceConfig::from(&file);
        assert_eq!(config.auto_recovery, AutoRecovery::ArmedOnce);
        assert_eq!(config.verbosity, DiagnosticsVerbosity::Dump);
    }
}

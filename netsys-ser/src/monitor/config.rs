//! Hang monitor configuration.

use crate::datapath::{DatapathId, HANG_THRESHOLD};
use std::time::Duration;

/// Default interval between monitor ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Sampling cadence and detector settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub tick_interval: Duration,
    /// Consecutive stale ticks before a hang is confirmed.
    pub hang_threshold: u32,
    /// Datapaths whose detectors never report.
    pub disabled_datapaths: Vec<DatapathId>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            hang_threshold: HANG_THRESHOLD,
            disabled_datapaths: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_hang_threshold(mut self, threshold: u32) -> Self {
        self.hang_threshold = threshold;
        self
    }

    pub fn with_disabled(mut self, datapaths: Vec<DatapathId>) -> Self {
        self.disabled_datapaths = datapaths;
        self
    }
}

impl From<&crate::config::ConfigFile> for MonitorConfig {
    fn from(config: &crate::config::ConfigFile) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.monitor.tick_interval_ms),
            hang_threshold: config.monitor.hang_threshold,
            disabled_datapaths: config.monitor.disabled_datapaths.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;

    #[test]
    fn test_default_matches_default_file() {
        assert_eq!(MonitorConfig::from(&ConfigFile::default()), MonitorConfig::default());
    }

    #[test]
    fn test_from_config_file_carries_disabled_list() {
        let mut file = ConfigFile::default();
        file.monitor.disabled_datapaths = vec![DatapathId::TdmaTx, DatapathId::TdmaRx];
        file.monitor.tick_interval_ms = 100;

        let config = MonitorConfig::from(&file);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.disabled_datapaths.len(), 2);
    }
}

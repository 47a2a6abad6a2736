//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let disabled = config
        .monitor
        .disabled_datapaths
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"[monitor]
; Interval between hang detector samples (milliseconds)
tick_interval_ms = {}
; Consecutive unchanged samples under load before a datapath counts as hung
hang_threshold = {}
; Comma-separated datapaths to exclude from hang detection
;   wdma_tx, wdma_rx, qdma_tx, qdma_rx, adma_rx, tdma_tx, tdma_rx, gdm_tx, gdm_rx
disabled_datapaths = {}
; What a confirmed hang does:
;   disabled - log only
;   enabled  - start a recovery run
;   once     - start one recovery run, then behave as disabled
auto_recovery = {}

[recovery]
; Longest wait for output queues to drain once admission stops (milliseconds)
drain_timeout_ms = {}
drain_poll_ms = {}
; Budget for the warm reset; on expiry the run escalates to a cold reset
warm_reset_timeout_ms = {}
; Budget for the cold reset; on expiry the run aborts and auto-recovery is disabled
cold_reset_timeout_ms = {}
reset_poll_ms = {}
; Longest wait for each flow-offload engine to go idle (milliseconds)
offload_idle_timeout_ms = {}
offload_poll_ms = {}

[rendezvous]
; Wait for accelerators to acknowledge stop and resume (milliseconds)
; A timed-out phase is re-broadcast once, then the run proceeds without it
stop_timeout_ms = {}
resume_timeout_ms = {}

[logging]
; Log directory and file name; the file is cleared on each start
directory = {}
file = {}
; Register dump at the start of each recovery run: quiet | dump
diagnostics = {}
"#,
        config.monitor.tick_interval_ms,
        config.monitor.hang_threshold,
        disabled,
        config.monitor.auto_recovery,
        config.recovery.drain_timeout_ms,
        config.recovery.drain_poll_ms,
        config.recovery.warm_reset_timeout_ms,
        config.recovery.cold_reset_timeout_ms,
        config.recovery.reset_poll_ms,
        config.recovery.offload_idle_timeout_ms,
        config.recovery.offload_poll_ms,
        config.rendezvous.stop_timeout_ms,
        config.rendezvous.resume_timeout_ms,
        path_to_string(&config.logging.directory),
        config.logging.file,
        config.logging.diagnostics,
    )
}

/// Render a path, abbreviating the home directory to `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{AutoRecovery, DiagnosticsVerbosity};
    use crate::datapath::DatapathId;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.monitor.hang_threshold = 7;
        config.monitor.disabled_datapaths = vec![DatapathId::AdmaRx, DatapathId::GdmTx];
        config.monitor.auto_recovery = AutoRecovery::Disabled;
        config.recovery.warm_reset_timeout_ms = 2500;
        config.rendezvous.stop_timeout_ms = 100;
        config.logging.directory = temp_dir.path().join("logs");
        config.logging.diagnostics = DiagnosticsVerbosity::Dump;

        config.save_to(&config_path).unwrap();

        let loaded = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_default_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.ini");

        ConfigFile::default().save_to(&config_path).unwrap();
        assert_eq!(ConfigFile::load_from(&config_path).unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_written_file_is_commented() {
        let content = to_config_string(&ConfigFile::default());
        assert!(content.contains("[monitor]"));
        assert!(content.contains("[recovery]"));
        assert!(content.contains("[rendezvous]"));
        assert!(content.contains("[logging]"));
        assert!(content.contains("; What a confirmed hang does:"));
        assert!(content.contains("auto_recovery = enabled"));
    }
}

//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::datapath::DatapathId;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [monitor] section
    if let Some(section) = ini.section(Some("monitor")) {
        if let Some(v) = interval_ms(section, "monitor", "tick_interval_ms")? {
            config.monitor.tick_interval_ms = v;
        }
        if let Some(v) = section.get("hang_threshold") {
            config.monitor.hang_threshold = match v.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => return Err(invalid("monitor", "hang_threshold", v, "expected an integer >= 1")),
            };
        }
        if let Some(v) = section.get("disabled_datapaths") {
            config.monitor.disabled_datapaths = parse_datapath_list(v)
                .map_err(|reason| invalid("monitor", "disabled_datapaths", v, &reason))?;
        }
        if let Some(v) = section.get("auto_recovery") {
            config.monitor.auto_recovery = v.parse().map_err(|_| {
                invalid(
                    "monitor",
                    "auto_recovery",
                    v,
                    "must be one of: disabled, enabled, once",
                )
            })?;
        }
    }

    // [recovery] section
    if let Some(section) = ini.section(Some("recovery")) {
        let recovery = &mut config.recovery;
        if let Some(v) = timeout_ms(section, "recovery", "drain_timeout_ms")? {
            recovery.drain_timeout_ms = v;
        }
        if let Some(v) = interval_ms(section, "recovery", "drain_poll_ms")? {
            recovery.drain_poll_ms = v;
        }
        if let Some(v) = timeout_ms(section, "recovery", "warm_reset_timeout_ms")? {
            recovery.warm_reset_timeout_ms = v;
        }
        if let Some(v) = timeout_ms(section, "recovery", "cold_reset_timeout_ms")? {
            recovery.cold_reset_timeout_ms = v;
        }
        if let Some(v) = interval_ms(section, "recovery", "reset_poll_ms")? {
            recovery.reset_poll_ms = v;
        }
        if let Some(v) = timeout_ms(section, "recovery", "offload_idle_timeout_ms")? {
            recovery.offload_idle_timeout_ms = v;
        }
        if let Some(v) = interval_ms(section, "recovery", "offload_poll_ms")? {
            recovery.offload_poll_ms = v;
        }
    }

    // [rendezvous] section
    if let Some(section) = ini.section(Some("rendezvous")) {
        if let Some(v) = timeout_ms(section, "rendezvous", "stop_timeout_ms")? {
            config.rendezvous.stop_timeout_ms = v;
        }
        if let Some(v) = timeout_ms(section, "rendezvous", "resume_timeout_ms")? {
            config.rendezvous.resume_timeout_ms = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
        if let Some(v) = section.get("diagnostics") {
            config.logging.diagnostics = v
                .parse()
                .map_err(|_| invalid("logging", "diagnostics", v, "must be one of: quiet, dump"))?;
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// A millisecond timeout; zero is allowed.
fn timeout_ms(
    section: &Properties,
    name: &str,
    key: &str,
) -> Result<Option<u64>, ConfigFileError> {
    section
        .get(key)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| invalid(name, key, v, "expected a number of milliseconds"))
        })
        .transpose()
}

/// A millisecond poll or tick interval; must be positive.
fn interval_ms(
    section: &Properties,
    name: &str,
    key: &str,
) -> Result<Option<u64>, ConfigFileError> {
    match timeout_ms(section, name, key)? {
        Some(0) => Err(invalid(name, key, "0", "interval must be at least 1 ms")),
        other => Ok(other),
    }
}

/// Parse a comma-separated datapath list. Empty means none.
pub(super) fn parse_datapath_list(value: &str) -> Result<Vec<DatapathId>, String> {
    let mut ids = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id = DatapathId::from_str(item)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

//! Logging setup for the controller.
//!
//! One `tracing` subscriber with two layers:
//! - a file layer writing `<directory>/<file>`, truncated on every start
//! - an optional stdout layer for foreground runs
//!
//! Filtering follows `RUST_LOG` and defaults to `info`, which shows state
//! transitions, confirmed hangs and aborts. Transient stale samples are
//! logged at `debug`.

use crate::config::LoggingSettings;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Keeps the non-blocking file writer alive; dropping it flushes the log.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    path: PathBuf,
}

impl LoggingGuard {
    /// Path of the log file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Creates the log directory and truncates the log file.
pub fn prepare_log_file(log_dir: &Path, log_file: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(log_file);
    fs::write(&path, "")?;
    Ok(path)
}

/// Installs the global subscriber.
///
/// Fails if the log file cannot be prepared. Must be called at most once
/// per process.
pub fn init_logging(log_dir: &Path, log_file: &str, stdout: bool) -> io::Result<LoggingGuard> {
    let path = prepare_log_file(log_dir, log_file)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stdout)
            .with_ansi(true)
            .with_target(false)
            .compact()
    });

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
        path,
    })
}

/// Installs the global subscriber from the `[logging]` section.
pub fn init_from_settings(settings: &LoggingSettings, stdout: bool) -> io::Result<LoggingGuard> {
    init_logging(&settings.directory, &settings.file, stdout)
}

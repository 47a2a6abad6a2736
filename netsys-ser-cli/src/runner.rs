//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization and starting the
//! service against a simulated engine, shared by `simulate` and `trigger`.

use crate::error::CliError;
use netsys_ser::config::ConfigFile;
use netsys_ser::logging::{init_from_settings, LoggingGuard};
use netsys_ser::port::sim::SimulatedEngine;
use netsys_ser::rendezvous::{ResponderBehavior, SimulatedAccelerator};
use netsys_ser::service::{NetsysService, ServiceConfig, ServiceHandle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Longest wait for simulated accelerators to register.
const ACCELERATOR_ONLINE_TIMEOUT: Duration = Duration::from_secs(2);

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Keeps the log writer alive while the runner exists.
    logging_guard: LoggingGuard,
    config: ConfigFile,
}

impl CliRunner {
    /// Load the config file and initialize logging.
    ///
    /// Logs go to the configured file; `verbose` mirrors them on stdout.
    pub fn new(config_path: &Path, verbose: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load_from(config_path)?;
        let logging_guard = init_from_settings(&config.logging, verbose)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!(
            version = netsys_ser::VERSION,
            command,
            log_file = %self.logging_guard.path().display(),
            "NetSys SER CLI"
        );
    }

    /// Service configuration built from the loaded file.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig::from(&self.config)
    }

    /// Start the service against a simulated engine.
    pub fn start_service(
        &self,
        engine: Arc<SimulatedEngine>,
        config: ServiceConfig,
    ) -> Result<ServiceHandle, CliError> {
        NetsysService::start(engine, config).map_err(CliError::from)
    }
}

/// Spawns simulated accelerators and waits until all are registered.
pub async fn attach_accelerators(
    handle: &ServiceHandle,
    behaviors: Vec<ResponderBehavior>,
    shutdown: &CancellationToken,
) -> Result<(), CliError> {
    let expected = behaviors.len();
    for (id, behavior) in behaviors.into_iter().enumerate() {
        SimulatedAccelerator::new(id as u32, behavior).spawn(
            handle.accelerator_link(),
            handle.subscribe_notices(),
            shutdown.clone(),
        );
    }

    tokio::time::timeout(ACCELERATOR_ONLINE_TIMEOUT, async {
        while handle.accelerators_online().len() < expected {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .map_err(|_| CliError::Simulation("accelerators did not come online".to_string()))
}

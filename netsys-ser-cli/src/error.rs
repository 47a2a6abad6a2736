//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use netsys_ser::config::ConfigFileError;
use netsys_ser::control::ControlError;
use netsys_ser::service::ServiceError;
use std::fmt;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Configuration file could not be read or written
    ConfigFile(ConfigFileError),
    /// Failed to start or stop the service
    Service(ServiceError),
    /// Operator level not recognised
    Control(ControlError),
    /// The simulation did not reach the expected point in time
    Simulation(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::ConfigFile(ConfigFileError::InvalidValue { .. }) => {
                eprintln!();
                eprintln!("Fix the value in the configuration file, or regenerate it with:");
                eprintln!("  netsys-ser config init --force");
            }
            CliError::Control(_) => {
                eprintln!();
                eprintln!("Levels:");
                eprintln!("  0 disable auto-recovery      4 diagnostics dump on");
                eprintln!("  1 full reset (warm)          5 diagnostics dump off");
                eprintln!("  2 enable auto-recovery       6 full reset (cold)");
                eprintln!("  3 stop traffic (warm)        7 stop traffic (cold)");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Service(e) => write!(f, "Service error: {}", e),
            CliError::Control(e) => write!(f, "Invalid control level: {}", e),
            CliError::Simulation(msg) => write!(f, "Simulation failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Service(e) => Some(e),
            CliError::Control(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}

impl From<ControlError> for CliError {
    fn from(e: ControlError) -> Self {
        CliError::Control(e)
    }
}

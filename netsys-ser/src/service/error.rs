//! Service error types.

use crate::config::ConfigFileError;
use thiserror::Error;

/// Errors from starting or stopping the controller service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// `start` was called outside a Tokio runtime.
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// The configuration file could not be loaded.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigFileError),

    /// A background task panicked or was aborted.
    #[error("Task '{task}' failed: {reason}")]
    TaskFailed { task: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_runtime_error() {
        let err = ServiceError::RuntimeError("no reactor running".to_string());
        assert!(err.to_string().contains("Runtime error"));
        assert!(err.to_string().contains("no reactor running"));
    }

    #[test]
    fn test_display_task_failed() {
        let err = ServiceError::TaskFailed {
            task: "hang-monitor",
            reason: "panicked".to_string(),
        };
        assert!(err.to_string().contains("hang-monitor"));
        assert!(err.to_string().contains("panicked"));
    }

    #[test]
    fn test_from_config_error() {
        let config_err = ConfigFileError::WriteError("disk full".to_string());
        let err: ServiceError = config_err.into();
        assert!(matches!(err, ServiceError::ConfigError(_)));
        let _: &dyn std::error::Error = &err;
    }
}

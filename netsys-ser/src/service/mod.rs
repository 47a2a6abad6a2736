//! Service facade for the frame engine recovery controller.
//!
//! # Example
//!
//! ```ignore
//! use netsys_ser::config::ConfigFile;
//! use netsys_ser::port::sim::SimulatedEngine;
//! use netsys_ser::recovery::RecoveryScope;
//! use netsys_ser::service::{NetsysService, ServiceConfig};
//!
//! let config = ServiceConfig::from(&ConfigFile::load()?);
//! let handle = NetsysService::start(Arc::new(SimulatedEngine::new()), config)?;
//!
//! let mut reports = handle.subscribe_reports();
//! handle.request_recovery(RecoveryScope::FullReset, false);
//! let report = reports.recv().await?;
//!
//! handle.shutdown().await?;
//! ```

mod config;
mod error;
mod facade;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use facade::{NetsysService, ServiceHandle};

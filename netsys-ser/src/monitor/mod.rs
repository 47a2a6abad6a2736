//! Hang monitoring.
//!
//! [`HangMonitor`] drives the detector bank on a fixed cadence and turns a
//! confirmed hang into a recovery request, subject to the auto-recovery
//! setting on the control surface.

mod config;
mod watchdog;

pub use config::{MonitorConfig, DEFAULT_TICK_INTERVAL};
pub use watchdog::{HangMonitor, TickReport};

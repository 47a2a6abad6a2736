//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (init, show, path)
//! - [`simulate`] - Hang injection against a simulated engine
//! - [`trigger`] - Operator control levels

pub mod common;
pub mod config;
pub mod simulate;
pub mod trigger;

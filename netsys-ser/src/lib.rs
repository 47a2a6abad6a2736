//! NetSys SER - fault recovery for a packet frame engine
//!
//! The controller samples the frame engine's DMA datapaths for hangs and,
//! when one is confirmed, runs a bounded recovery: quiesce traffic, stop the
//! accelerators that share the engine's rings, reset (warm, then cold),
//! resume, and restore the queue configuration lost in the reset.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```ignore
//! use netsys_ser::service::{NetsysService, ServiceConfig};
//!
//! let handle = NetsysService::start(port, ServiceConfig::default())?;
//! let link = handle.accelerator_link();
//! // ... hand `link` and `handle.subscribe_notices()` to the accelerator transport
//! handle.shutdown().await?;
//! ```
//!
//! # Components
//!
//! - [`datapath`]: per-datapath hang detectors
//! - [`monitor`]: periodic sampling and recovery requests
//! - [`recovery`]: the request gate and the recovery state machine
//! - [`rendezvous`]: stop/resume barrier with external accelerators
//! - [`snapshot`]: queue configuration saved across a reset
//! - [`control`]: operator policy and commands
//! - [`port`]: the register access boundary and a simulated engine

pub mod config;
pub mod control;
pub mod datapath;
pub mod logging;
pub mod monitor;
pub mod port;
pub mod recovery;
pub mod rendezvous;
pub mod service;
pub mod snapshot;

/// Version of the NetSys SER library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

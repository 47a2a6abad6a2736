//! Register access boundary.
//!
//! Everything the controller knows about the hardware goes through the
//! [`RegisterPort`] trait. Bit layouts and MMIO live behind it; this crate
//! only sees decoded samples, port state, queue blobs and reset handles.
//!
//! [`SharedPort`] pairs a port with an access gate so that the monitor can
//! sample concurrently with itself while the orchestrator takes exclusive
//! access for the whole reset.

pub mod sim;

use crate::datapath::{DatapathId, Sample};
use crate::recovery::RecoveryScope;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// =============================================================================
// Identifiers and values
// =============================================================================

/// A front-panel or internal MAC port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(pub u8);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gmac{}", self.0)
    }
}

/// A hardware transmit queue with its own scheduling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(pub u16);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txq{}", self.0)
    }
}

/// Opaque per-queue scheduling blob (rate limits, weights, scheduler
/// selection) as read back from the hardware.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueConfig(pub Vec<u32>);

/// Negotiated link parameters to restore after a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub speed_mbps: u32,
    pub full_duplex: bool,
    pub pause: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            speed_mbps: 1000,
            full_duplex: true,
            pause: true,
        }
    }
}

/// Administrative and link state of one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortState {
    pub admin_up: bool,
    pub ingress_drop: bool,
    pub link: LinkConfig,
}

/// Frame-engine error interrupt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorEvents {
    pub fq_empty: bool,
    pub tso_fail: bool,
    pub tso_illegal: bool,
    pub tso_align: bool,
    pub rfifo_overflow: bool,
    pub rfifo_underflow: bool,
}

impl ErrorEvents {
    /// True when no event is asserted.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Reset strength. Cold also resets the shared reset-controller domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResetTier {
    Warm,
    Cold,
}

impl fmt::Display for ResetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetTier::Warm => f.write_str("warm"),
            ResetTier::Cold => f.write_str("cold"),
        }
    }
}

/// Token for an issued reset, used to poll for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResetHandle {
    pub id: u64,
    pub tier: ResetTier,
}

// =============================================================================
// Errors
// =============================================================================

/// Failure of a register operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortError {
    /// A register access failed.
    #[error("register access failed during {op}: {detail}")]
    Io { op: &'static str, detail: String },

    /// The hardware block is not present or powered down.
    #[error("hardware unavailable: {0}")]
    Unavailable(String),

    /// A reset handle was not issued by this port or already completed.
    #[error("unknown reset handle {0}")]
    InvalidHandle(u64),
}

// =============================================================================
// RegisterPort
// =============================================================================

/// Abstract register access to the frame engine.
pub trait RegisterPort: Send + Sync {
    // --- datapath ---

    /// Reads the current signals of one datapath.
    fn read_datapath_sample(&self, id: DatapathId) -> Result<Sample, PortError>;

    // --- engine ---

    fn set_engine_dma_enabled(&self, enabled: bool) -> Result<(), PortError>;
    fn set_interrupts_enabled(&self, enabled: bool) -> Result<(), PortError>;
    /// Frames still held in the packet-switch output queues.
    fn output_queue_depth(&self) -> Result<u32, PortError>;
    /// Reads and acknowledges the error interrupt status.
    fn read_error_events(&self) -> Result<ErrorEvents, PortError>;
    /// Emits a register dump to the port's diagnostic sink.
    fn dump_diagnostics(&self) -> Result<(), PortError>;

    // --- ports ---

    fn port_ids(&self) -> Vec<PortId>;
    fn read_port_state(&self, port: PortId) -> Result<PortState, PortError>;
    fn set_port_admin_up(&self, port: PortId, up: bool) -> Result<(), PortError>;
    fn set_ingress_drop(&self, port: PortId, drop: bool) -> Result<(), PortError>;
    fn restore_link_config(&self, port: PortId, link: &LinkConfig) -> Result<(), PortError>;

    // --- flow offload ---

    fn offload_engine_count(&self) -> u8;
    /// Stops new flow binding on an offload engine ahead of a reset.
    fn prepare_offload_engine(&self, engine: u8) -> Result<(), PortError>;
    fn offload_engine_busy(&self, engine: u8) -> Result<bool, PortError>;

    // --- reset ---

    fn issue_reset(&self, tier: ResetTier, scope: RecoveryScope)
        -> Result<ResetHandle, PortError>;
    fn poll_reset_complete(&self, handle: ResetHandle) -> Result<bool, PortError>;

    // --- queue configuration ---

    fn queue_ids(&self) -> Vec<QueueId>;
    fn read_queue_config(&self, queue: QueueId) -> Result<QueueConfig, PortError>;
    fn write_queue_config(&self, queue: QueueId, config: &QueueConfig) -> Result<(), PortError>;
}

// =============================================================================
// SharedPort
// =============================================================================

/// A register port shared between the monitor and the orchestrator.
///
/// The gate carries no data. Samplers hold a read guard for the duration of
/// a tick; the orchestrator holds the write guard while the engine is in
/// reset, which makes samplers skip instead of reading a block mid-reset.
#[derive(Clone)]
pub struct SharedPort {
    port: Arc<dyn RegisterPort>,
    gate: Arc<RwLock<()>>,
}

impl SharedPort {
    pub fn new(port: Arc<dyn RegisterPort>) -> Self {
        Self {
            port,
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// The underlying port.
    pub fn port(&self) -> &dyn RegisterPort {
        &*self.port
    }

    /// Shared access for sampling, or `None` while a reset holds the gate.
    pub fn try_sample_access(&self) -> Option<RwLockReadGuard<'_, ()>> {
        self.gate.try_read().ok()
    }

    /// Exclusive access for the reset stage.
    pub async fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }
}

impl fmt::Debug for SharedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPort").finish_non_exhaustive()
    }
}

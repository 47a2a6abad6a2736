//! Rendezvous vocabulary shared by the registry, the link and accelerators.

use crate::recovery::RecoveryScope;
use std::fmt;
use thiserror::Error;

/// An external accelerator unit (wireless offload engine or similar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AcceleratorId(pub u32);

impl fmt::Display for AcceleratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acc{}", self.0)
    }
}

/// The two checkpoints of every recovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Accelerators must stop using the shared DMA rings.
    Stop,
    /// The engine is back; accelerators may restart.
    Resume,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Stop => f.write_str("stop"),
            Phase::Resume => f.write_str("resume"),
        }
    }
}

/// Broadcast to accelerators when a phase opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseNotice {
    pub phase: Phase,
    pub scope: RecoveryScope,
    /// Increments with every opened phase.
    pub epoch: u64,
}

/// Message from the accelerator-facing transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceleratorEvent {
    Online(AcceleratorId),
    Offline(AcceleratorId),
    Ack {
        id: AcceleratorId,
        phase: Phase,
    },
    Failure {
        id: AcceleratorId,
        phase: Phase,
        reason: String,
    },
}

/// How waiting on a phase ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseResult {
    /// Every unit that was online when the phase opened acknowledged or left.
    Completed,
    /// The deadline passed with acknowledgements outstanding.
    TimedOut { pending: usize },
    /// A unit reported it cannot comply.
    Failed { id: AcceleratorId, reason: String },
}

/// Rendezvous errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RendezvousError {
    #[error("cannot open {requested} phase while {open} phase is open")]
    PhaseAlreadyOpen { open: Phase, requested: Phase },

    #[error("no {0} phase is open")]
    PhaseNotOpen(Phase),

    #[error("accelerator event channel closed")]
    LinkClosed,
}

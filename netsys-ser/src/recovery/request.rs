//! Recovery requests.

use crate::datapath::DatapathId;
use std::fmt;

/// How much of the engine a recovery run takes down.
///
/// Ordered: escalation only ever moves from `StopTraffic` to `FullReset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecoveryScope {
    /// Halt traffic, reset the frame-engine datapaths, resume.
    StopTraffic,
    /// Also reinitialise the accelerator-facing DMA blocks.
    FullReset,
}

impl RecoveryScope {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryScope::StopTraffic => "stop_traffic",
            RecoveryScope::FullReset => "full_reset",
        }
    }
}

impl fmt::Display for RecoveryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a recovery was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryCause {
    /// A detector confirmed a hang.
    HangDetected(DatapathId),
    /// An operator asked for it.
    Manual,
    /// Another subsystem asked for it through the service handle.
    ExternalTrigger,
}

impl fmt::Display for RecoveryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCause::HangDetected(id) => write!(f, "hang({id})"),
            RecoveryCause::Manual => f.write_str("manual"),
            RecoveryCause::ExternalTrigger => f.write_str("external"),
        }
    }
}

/// One request for a recovery run. Consumed once by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryRequest {
    pub scope: RecoveryScope,
    pub cause: RecoveryCause,
    /// Skip the warm tier and reset the shared reset-controller domain.
    pub cold_reset: bool,
}

impl RecoveryRequest {
    /// Request raised by a confirmed hang on `id`.
    pub fn hang(id: DatapathId) -> Self {
        Self {
            scope: id.requested_scope(),
            cause: RecoveryCause::HangDetected(id),
            cold_reset: false,
        }
    }

    /// Operator-initiated request.
    pub fn manual(scope: RecoveryScope, cold_reset: bool) -> Self {
        Self {
            scope,
            cause: RecoveryCause::Manual,
            cold_reset,
        }
    }

    /// Request from another subsystem.
    pub fn external(scope: RecoveryScope, cold_reset: bool) -> Self {
        Self {
            scope,
            cause: RecoveryCause::ExternalTrigger,
            cold_reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_ordering() {
        assert!(RecoveryScope::StopTraffic < RecoveryScope::FullReset);
        assert_eq!(
            RecoveryScope::StopTraffic.max(RecoveryScope::FullReset),
            RecoveryScope::FullReset
        );
    }

    #[test]
    fn test_hang_request_uses_datapath_scope() {
        let req = RecoveryRequest::hang(DatapathId::QdmaTx);
        assert_eq!(req.scope, RecoveryScope::StopTraffic);
        assert_eq!(req.cause, RecoveryCause::HangDetected(DatapathId::QdmaTx));
        assert!(!req.cold_reset);
    }

    #[test]
    fn test_cause_display() {
        assert_eq!(
            RecoveryCause::HangDetected(DatapathId::GdmRx).to_string(),
            "hang(gdm_rx)"
        );
        assert_eq!(RecoveryCause::Manual.to_string(), "manual");
    }
}

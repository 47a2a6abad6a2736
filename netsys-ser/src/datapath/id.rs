//! Datapath identities and modes.

use crate::recovery::RecoveryScope;
use std::fmt;
use std::str::FromStr;

/// One of the nine monitored hardware datapaths.
///
/// The declaration order is the fixed evaluation priority used by the hang
/// monitor: when several detectors fire in the same tick, the earliest one
/// in this order decides the recovery scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatapathId {
    /// Wireless DMA transmit ring (engine → accelerator).
    WdmaTx,
    /// Wireless DMA receive ring (accelerator → engine).
    WdmaRx,
    /// QDMA transmit scheduler.
    QdmaTx,
    /// QDMA receive free-queue.
    QdmaRx,
    /// ADMA (PDMA) receive ring.
    AdmaRx,
    /// TDMA transmit path towards the offload co-processor.
    TdmaTx,
    /// TDMA receive path from the offload co-processor.
    TdmaRx,
    /// GDM egress towards the MACs.
    GdmTx,
    /// GDM ingress from the MACs.
    GdmRx,
}

impl DatapathId {
    /// All datapaths in priority order.
    pub const ALL: [DatapathId; 9] = [
        DatapathId::WdmaTx,
        DatapathId::WdmaRx,
        DatapathId::QdmaTx,
        DatapathId::QdmaRx,
        DatapathId::AdmaRx,
        DatapathId::TdmaTx,
        DatapathId::TdmaRx,
        DatapathId::GdmTx,
        DatapathId::GdmRx,
    ];

    /// Position of this datapath in the priority order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable lowercase name used in logs and configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            DatapathId::WdmaTx => "wdma_tx",
            DatapathId::WdmaRx => "wdma_rx",
            DatapathId::QdmaTx => "qdma_tx",
            DatapathId::QdmaRx => "qdma_rx",
            DatapathId::AdmaRx => "adma_rx",
            DatapathId::TdmaTx => "tdma_tx",
            DatapathId::TdmaRx => "tdma_rx",
            DatapathId::GdmTx => "gdm_tx",
            DatapathId::GdmRx => "gdm_rx",
        }
    }

    /// Recovery scope requested when this datapath is confirmed hung.
    ///
    /// Paths adjacent to the wire or the accelerators need the whole engine
    /// reinitialised; queue-only paths try a traffic stop first.
    pub fn requested_scope(self) -> RecoveryScope {
        match self {
            DatapathId::WdmaTx
            | DatapathId::WdmaRx
            | DatapathId::AdmaRx
            | DatapathId::GdmTx
            | DatapathId::GdmRx => RecoveryScope::FullReset,
            DatapathId::QdmaTx
            | DatapathId::QdmaRx
            | DatapathId::TdmaTx
            | DatapathId::TdmaRx => RecoveryScope::StopTraffic,
        }
    }
}

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatapathId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        DatapathId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| format!("unknown datapath '{}'", s.trim()))
    }
}

/// Hardware mode a datapath was configured in when sampled.
///
/// GDM and XGDM ingress/egress alias onto the same physical counters, so the
/// GDM detectors pick their signal set from the mode reported with each
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatapathMode {
    /// Datapath with a single signal layout.
    #[default]
    Standard,
    /// MAC attached through the 1G GDM block.
    Gdm,
    /// MAC attached through the 10G XGDM block.
    Xgdm,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order_matches_declaration() {
        for (position, id) in DatapathId::ALL.iter().enumerate() {
            assert_eq!(id.index(), position);
        }
    }

    #[test]
    fn test_parse_accepts_dashes_and_case() {
        assert_eq!("QDMA-TX".parse::<DatapathId>(), Ok(DatapathId::QdmaTx));
        assert_eq!(" gdm_rx ".parse::<DatapathId>(), Ok(DatapathId::GdmRx));
        assert!("pdma_tx".parse::<DatapathId>().is_err());
    }

    #[test]
    fn test_wire_adjacent_paths_request_full_reset() {
        assert_eq!(
            DatapathId::GdmTx.requested_scope(),
            RecoveryScope::FullReset
        );
        assert_eq!(
            DatapathId::AdmaRx.requested_scope(),
            RecoveryScope::FullReset
        );
        assert_eq!(
            DatapathId::QdmaTx.requested_scope(),
            RecoveryScope::StopTraffic
        );
    }

    #[test]
    fn test_display_round_trips() {
        for id in DatapathId::ALL {
            assert_eq!(id.to_string().parse::<DatapathId>(), Ok(id));
        }
    }
}

//! Hardware signals, samples and per-datapath signal sets.
//!
//! A [`Sample`] is whatever the register port could read for a datapath in
//! one pass. Detectors never interpret it directly; they go through the
//! [`SignalSet`] chosen for the datapath and the mode reported in the sample.

use super::id::{DatapathId, DatapathMode};
use std::collections::BTreeMap;

/// A decoded hardware indicator.
///
/// Values arrive already extracted from their registers: busy flags are `0`
/// or `1`, occupancies are entry counts, pointers are ring indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Signal {
    /// DMA transmit ring index last consumed by hardware.
    TxRingPointer,
    /// DMA receive ring index last produced by hardware.
    RxRingPointer,
    /// Transmit DMA busy flag.
    TxBusy,
    /// Receive DMA busy flag.
    RxBusy,
    /// Raw FSM state word.
    FsmState,
    /// FSM reports a non-idle state.
    FsmBusy,
    /// Packet-switch output queue occupancy feeding this path.
    OutputQueue,
    /// Packet-switch input queue occupancy fed by this path.
    InputQueue,
    /// Forwarded-descriptor counter.
    ForwardCount,
    /// Free-queue head index.
    FreeQueueHead,
    /// Free-queue tail index.
    FreeQueueTail,
    /// MACs currently receiving pause frames; non-zero means the link
    /// partner is throttling transmit.
    RxFlowControl,
    /// MAC MIB packet counter.
    MibCounter,
    /// MAC FSM state word.
    MacFsm,
    /// MAC reports it is not idle.
    MacBusy,
    /// Receive FIFO ready for the DMA.
    FifoReady,
}

/// One observation of a datapath's signals.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sample {
    mode: DatapathMode,
    values: BTreeMap<Signal, u32>,
}

impl Sample {
    /// Creates an empty sample taken in the given mode.
    pub fn new(mode: DatapathMode) -> Self {
        Self {
            mode,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, signal: Signal, value: u32) -> Self {
        self.values.insert(signal, value);
        self
    }

    /// Sets a signal value.
    pub fn set(&mut self, signal: Signal, value: u32) {
        self.values.insert(signal, value);
    }

    /// Returns a signal value; signals the port did not report read as zero.
    pub fn get(&self, signal: Signal) -> u32 {
        self.values.get(&signal).copied().unwrap_or(0)
    }

    /// Mode the datapath was configured in when sampled.
    pub fn mode(&self) -> DatapathMode {
        self.mode
    }

    /// Iterates over the reported signals in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (Signal, u32)> + '_ {
        self.values.iter().map(|(s, v)| (*s, *v))
    }
}

/// The signals a detector watches for one datapath in one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSet {
    /// Indicators that change while the datapath makes progress.
    pub progress: &'static [Signal],
    /// Indicators that must all be non-zero for the path to count as loaded.
    pub backpressure: &'static [Signal],
    /// Indicators that excuse a stall: any non-zero value means the path is
    /// legitimately held back and does not count as loaded.
    pub exempt: &'static [Signal],
}

impl SignalSet {
    /// Selects the signal set for a datapath given the mode of the sample.
    pub fn for_datapath(id: DatapathId, mode: DatapathMode) -> SignalSet {
        use Signal::*;

        match (id, mode) {
            (DatapathId::WdmaTx, _) => SignalSet {
                progress: &[TxRingPointer],
                backpressure: &[TxBusy],
                exempt: &[],
            },
            (DatapathId::WdmaRx, _) => SignalSet {
                progress: &[RxRingPointer, OutputQueue],
                backpressure: &[RxBusy, OutputQueue],
                exempt: &[],
            },
            (DatapathId::QdmaTx, _) => SignalSet {
                progress: &[ForwardCount],
                backpressure: &[FsmBusy],
                exempt: &[RxFlowControl],
            },
            (DatapathId::QdmaRx, _) => SignalSet {
                progress: &[FreeQueueHead, FreeQueueTail],
                backpressure: &[FsmBusy],
                exempt: &[],
            },
            (DatapathId::AdmaRx, _) => SignalSet {
                progress: &[RxRingPointer],
                backpressure: &[OutputQueue, FsmBusy, FifoReady],
                exempt: &[],
            },
            (DatapathId::TdmaTx, _) => SignalSet {
                progress: &[FsmState, InputQueue],
                backpressure: &[InputQueue, FsmBusy, TxBusy],
                exempt: &[],
            },
            (DatapathId::TdmaRx, _) => SignalSet {
                progress: &[FsmState],
                backpressure: &[FsmBusy, RxBusy],
                exempt: &[],
            },
            (DatapathId::GdmTx, DatapathMode::Xgdm) => SignalSet {
                progress: &[MibCounter],
                backpressure: &[OutputQueue],
                exempt: &[],
            },
            (DatapathId::GdmTx, _) => SignalSet {
                progress: &[MibCounter, MacFsm],
                backpressure: &[MacBusy, OutputQueue],
                exempt: &[],
            },
            (DatapathId::GdmRx, DatapathMode::Xgdm) => SignalSet {
                progress: &[MibCounter, InputQueue],
                backpressure: &[InputQueue],
                exempt: &[],
            },
            (DatapathId::GdmRx, _) => SignalSet {
                progress: &[FsmState, InputQueue],
                backpressure: &[InputQueue, MacBusy],
                exempt: &[],
            },
        }
    }

    /// Projects a sample onto this set: progress values, then backpressure.
    pub fn project(&self, sample: &Sample) -> Vec<u32> {
        self.progress
            .iter()
            .chain(self.backpressure.iter())
            .map(|signal| sample.get(*signal))
            .collect()
    }

    /// True when every backpressure indicator shows pending work and no
    /// exempting indicator is raised.
    pub fn is_loaded(&self, sample: &Sample) -> bool {
        self.backpressure.iter().all(|signal| sample.get(*signal) != 0)
            && self.exempt.iter().all(|signal| sample.get(*signal) == 0)
    }

    /// Signals relevant to this set, for diagnostics.
    pub fn signals(&self) -> impl Iterator<Item = Signal> + '_ {
        self.progress.iter().chain(self.backpressure.iter()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_signal_reads_zero() {
        let sample = Sample::new(DatapathMode::Standard).with(Signal::TxBusy, 1);
        assert_eq!(sample.get(Signal::TxBusy), 1);
        assert_eq!(sample.get(Signal::TxRingPointer), 0);
    }

    #[test]
    fn test_gdm_set_depends_on_mode() {
        let gdm = SignalSet::for_datapath(DatapathId::GdmRx, DatapathMode::Gdm);
        let xgdm = SignalSet::for_datapath(DatapathId::GdmRx, DatapathMode::Xgdm);
        assert_ne!(gdm, xgdm);
        assert!(gdm.progress.contains(&Signal::FsmState));
        assert!(xgdm.progress.contains(&Signal::MibCounter));
    }

    #[test]
    fn test_standard_mode_gdm_uses_gdm_layout() {
        assert_eq!(
            SignalSet::for_datapath(DatapathId::GdmTx, DatapathMode::Standard),
            SignalSet::for_datapath(DatapathId::GdmTx, DatapathMode::Gdm)
        );
    }

    #[test]
    fn test_loaded_requires_every_backpressure_signal() {
        let set = SignalSet::for_datapath(DatapathId::AdmaRx, DatapathMode::Standard);
        let partial = Sample::default()
            .with(Signal::OutputQueue, 3)
            .with(Signal::FsmBusy, 1);
        assert!(!set.is_loaded(&partial));

        let loaded = partial.with(Signal::FifoReady, 1);
        assert!(set.is_loaded(&loaded));
    }

    #[test]
    fn test_rx_flow_control_exempts_qdma_tx() {
        let set = SignalSet::for_datapath(DatapathId::QdmaTx, DatapathMode::Standard);
        let busy = Sample::default().with(Signal::FsmBusy, 1);
        assert!(set.is_loaded(&busy));

        let paused = busy.with(Signal::RxFlowControl, 2);
        assert!(!set.is_loaded(&paused));
    }

    #[test]
    fn test_projection_ignores_unrelated_signals() {
        let set = SignalSet::for_datapath(DatapathId::WdmaTx, DatapathMode::Standard);
        let a = Sample::default()
            .with(Signal::TxRingPointer, 7)
            .with(Signal::TxBusy, 1)
            .with(Signal::MibCounter, 100);
        let b = a.clone().with(Signal::MibCounter, 200);
        assert_eq!(set.project(&a), set.project(&b));
    }
}

//! The set of nine detectors shared by the monitor and the orchestrator.

use super::detector::{HangDetector, Verdict, HANG_THRESHOLD};
use super::id::DatapathId;
use crate::port::RegisterPort;
use parking_lot::Mutex;
use std::sync::Arc;

/// Result of sampling every detector once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankVerdict {
    /// Per-datapath verdicts, in priority order. Disabled detectors are absent.
    pub verdicts: Vec<(DatapathId, Verdict)>,
}

impl BankVerdict {
    /// First datapath in priority order that reported `Stale`.
    pub fn first_stale(&self) -> Option<DatapathId> {
        self.verdicts
            .iter()
            .find(|(_, verdict)| *verdict == Verdict::Stale)
            .map(|(id, _)| *id)
    }

    /// All datapaths that reported `Stale` this round.
    pub fn stale(&self) -> Vec<DatapathId> {
        self.verdicts
            .iter()
            .filter(|(_, verdict)| *verdict == Verdict::Stale)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Owns one detector per datapath.
///
/// Cloning shares the same detectors. The monitor samples through the bank
/// and the orchestrator rearms it after a successful reattach.
#[derive(Debug, Clone)]
pub struct DetectorBank {
    detectors: Arc<Mutex<Vec<HangDetector>>>,
}

impl DetectorBank {
    /// Creates a bank with every datapath enabled at the default threshold.
    pub fn new() -> Self {
        Self::with_config(HANG_THRESHOLD, &[])
    }

    /// Creates a bank with the given threshold and a set of absent datapaths.
    pub fn with_config(threshold: u32, disabled: &[DatapathId]) -> Self {
        let detectors = DatapathId::ALL
            .into_iter()
            .map(|id| {
                let detector = if disabled.contains(&id) {
                    HangDetector::disabled(id)
                } else {
                    HangDetector::new(id)
                };
                detector.with_threshold(threshold)
            })
            .collect();

        Self {
            detectors: Arc::new(Mutex::new(detectors)),
        }
    }

    /// Samples every enabled detector in priority order.
    ///
    /// Sampling continues after the first `Stale` so every detector keeps
    /// its history current.
    pub fn sample_all(&self, port: &dyn RegisterPort) -> BankVerdict {
        let mut detectors = self.detectors.lock();
        let verdicts = detectors
            .iter_mut()
            .filter(|d| d.is_enabled())
            .map(|d| (d.id(), d.sample(port)))
            .collect();
        BankVerdict { verdicts }
    }

    /// Rearms every detector.
    pub fn rearm_all(&self) {
        for detector in self.detectors.lock().iter_mut() {
            detector.rearm();
        }
    }

    /// Current stale-run length per enabled datapath.
    pub fn stale_counts(&self) -> Vec<(DatapathId, u32)> {
        self.detectors
            .lock()
            .iter()
            .filter(|d| d.is_enabled())
            .map(|d| (d.id(), d.consecutive_stale()))
            .collect()
    }

    /// Datapaths with an enabled detector.
    pub fn enabled(&self) -> Vec<DatapathId> {
        self.detectors
            .lock()
            .iter()
            .filter(|d| d.is_enabled())
            .map(|d| d.id())
            .collect()
    }
}

impl Default for DetectorBank {
    fn default() -> Self {
        Self::new()
    }
}

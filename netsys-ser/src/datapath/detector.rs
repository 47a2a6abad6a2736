//! Per-datapath hang detection with debouncing.
//!
//! A detector compares each new sample against the previous one. A datapath
//! counts as stale for a tick when its progress indicators did not move and
//! its backpressure indicators all show pending work. Only a run of
//! `threshold` consecutive stale ticks is reported as a hang.

use super::id::DatapathId;
use super::signal::{Sample, SignalSet};
use crate::port::RegisterPort;
use tracing::{debug, warn};

/// Consecutive stale ticks before a datapath is reported as hung.
pub const HANG_THRESHOLD: u32 = 5;

/// Result of sampling one datapath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Progress observed, path idle, or not stale long enough yet.
    Clear,
    /// The stale run reached the threshold.
    Stale,
}

/// Hang detector state for one datapath.
#[derive(Debug, Clone)]
pub struct HangDetector {
    id: DatapathId,
    enabled: bool,
    threshold: u32,
    previous: Option<Sample>,
    consecutive_stale: u32,
    /// Set once the current stale run has been logged as a hang.
    reported: bool,
}

impl HangDetector {
    /// Creates an enabled detector with the default threshold.
    pub fn new(id: DatapathId) -> Self {
        Self {
            id,
            enabled: true,
            threshold: HANG_THRESHOLD,
            previous: None,
            consecutive_stale: 0,
            reported: false,
        }
    }

    /// Creates a detector for a datapath the hardware does not have.
    pub fn disabled(id: DatapathId) -> Self {
        Self {
            enabled: false,
            ..Self::new(id)
        }
    }

    /// Sets the stale-run threshold (minimum 1).
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    /// Datapath this detector watches.
    pub fn id(&self) -> DatapathId {
        self.id
    }

    /// Whether the detector samples at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stale-run threshold.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Length of the current stale run.
    pub fn consecutive_stale(&self) -> u32 {
        self.consecutive_stale
    }

    /// Last sample seen, if any.
    pub fn previous(&self) -> Option<&Sample> {
        self.previous.as_ref()
    }

    /// Reads the datapath through the port and feeds the debounce.
    ///
    /// A read failure is not a detector failure: it is logged, the stale run
    /// is broken, and the verdict is `Clear`.
    pub fn sample(&mut self, port: &dyn RegisterPort) -> Verdict {
        if !self.enabled {
            return Verdict::Clear;
        }

        match port.read_datapath_sample(self.id) {
            Ok(sample) => self.observe(sample),
            Err(e) => {
                debug!(datapath = %self.id, error = %e, "Datapath sample read failed");
                self.previous = None;
                self.consecutive_stale = 0;
                self.reported = false;
                Verdict::Clear
            }
        }
    }

    /// Feeds one sample into the debounce and returns the verdict.
    pub fn observe(&mut self, sample: Sample) -> Verdict {
        if !self.enabled {
            return Verdict::Clear;
        }

        // Chosen per sample: GDM/XGDM share counters and the mode can change.
        let set = SignalSet::for_datapath(self.id, sample.mode());

        let unchanged = self.previous.as_ref().is_some_and(|previous| {
            previous.mode() == sample.mode() && set.project(previous) == set.project(&sample)
        });

        if unchanged && set.is_loaded(&sample) {
            self.consecutive_stale = self.consecutive_stale.saturating_add(1);
        } else {
            self.consecutive_stale = 0;
            self.reported = false;
        }

        let verdict = if self.consecutive_stale >= self.threshold {
            if !self.reported {
                self.reported = true;
                warn!(
                    datapath = %self.id,
                    stale_ticks = self.consecutive_stale,
                    threshold = self.threshold,
                    signals = ?set.signals().map(|s| (s, sample.get(s))).collect::<Vec<_>>(),
                    "Datapath hang confirmed"
                );
            }
            Verdict::Stale
        } else {
            if self.consecutive_stale > 0 {
                debug!(
                    datapath = %self.id,
                    stale_ticks = self.consecutive_stale,
                    threshold = self.threshold,
                    "Datapath stale (transient)"
                );
            }
            Verdict::Clear
        };

        self.previous = Some(sample);
        verdict
    }

    /// Forgets history so the next stale run starts from zero.
    pub fn rearm(&mut self) {
        self.previous = None;
        self.consecutive_stale = 0;
        self.reported = false;
    }
}

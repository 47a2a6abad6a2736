//! Datapath hang detection.
//!
//! Nine datapaths of the frame engine are watched independently. Each one has
//! a [`HangDetector`] that turns successive [`Sample`]s into a debounced
//! [`Verdict`]. The [`DetectorBank`] owns all nine and samples them in the
//! fixed priority order given by [`DatapathId::ALL`].

mod bank;
mod detector;
mod id;
mod signal;

pub use bank::{BankVerdict, DetectorBank};
pub use detector::{HangDetector, Verdict, HANG_THRESHOLD};
pub use id::{DatapathId, DatapathMode};
pub use signal::{Sample, Signal, SignalSet};

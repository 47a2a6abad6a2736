//! Process-lifetime recovery counters.
//!
//! These are the controller's externally observable state: how often it
//! triggered, how hard it had to push, and how runs ended. All counters are
//! lock-free and can be reset by an operator.

use super::outcome::RecoveryOutcome;
use super::request::RecoveryCause;
use crate::datapath::DatapathId;
use crate::port::ErrorEvents;
use crate::rendezvous::Phase;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`RecoveryCounters`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub runs_total: u64,
    pub triggers_hang: u64,
    pub triggers_manual: u64,
    pub triggers_external: u64,
    /// Hang triggers per datapath, indexed by [`DatapathId::index`].
    pub hangs_by_datapath: [u64; 9],
    pub warm_reset_attempts: u64,
    pub warm_reset_completions: u64,
    pub cold_reset_escalations: u64,
    pub cold_resets_issued: u64,
    pub stop_timeouts: u64,
    pub resume_timeouts: u64,
    pub stop_failures: u64,
    pub resume_failures: u64,
    pub drain_timeouts: u64,
    pub offload_idle_timeouts: u64,
    pub outcomes_succeeded: u64,
    pub outcomes_escalated: u64,
    pub outcomes_failed: u64,
    pub config_mismatches: u64,
    pub events_fq_empty: u64,
    pub events_tso_fail: u64,
    pub events_tso_illegal: u64,
    pub events_tso_align: u64,
    pub events_rfifo_overflow: u64,
    pub events_rfifo_underflow: u64,
    /// Runs started by a detector or an operator.
    pub events_force: u64,
}

impl CountersSnapshot {
    pub fn hangs(&self, id: DatapathId) -> u64 {
        self.hangs_by_datapath[id.index()]
    }

    /// Named values in display order.
    pub fn entries(&self) -> Vec<(&'static str, u64)> {
        let mut entries = vec![
            ("runs_total", self.runs_total),
            ("triggers_hang", self.triggers_hang),
            ("triggers_manual", self.triggers_manual),
            ("triggers_external", self.triggers_external),
        ];
        for id in DatapathId::ALL {
            entries.push((id.as_str(), self.hangs(id)));
        }
        entries.extend([
            ("warm_reset_attempts", self.warm_reset_attempts),
            ("warm_reset_completions", self.warm_reset_completions),
            ("cold_reset_escalations", self.cold_reset_escalations),
            ("cold_resets_issued", self.cold_resets_issued),
            ("stop_timeouts", self.stop_timeouts),
            ("resume_timeouts", self.resume_timeouts),
            ("stop_failures", self.stop_failures),
            ("resume_failures", self.resume_failures),
            ("drain_timeouts", self.drain_timeouts),
            ("offload_idle_timeouts", self.offload_idle_timeouts),
            ("outcomes_succeeded", self.outcomes_succeeded),
            ("outcomes_escalated", self.outcomes_escalated),
            ("outcomes_failed", self.outcomes_failed),
            ("config_mismatches", self.config_mismatches),
            ("events_fq_empty", self.events_fq_empty),
            ("events_tso_fail", self.events_tso_fail),
            ("events_tso_illegal", self.events_tso_illegal),
            ("events_tso_align", self.events_tso_align),
            ("events_rfifo_overflow", self.events_rfifo_overflow),
            ("events_rfifo_underflow", self.events_rfifo_underflow),
            ("events_force", self.events_force),
        ]);
        entries
    }
}

/// Recovery counters with atomic updates.
#[derive(Debug, Default)]
pub struct RecoveryCounters {
    runs_total: AtomicU64,
    triggers_hang: AtomicU64,
    triggers_manual: AtomicU64,
    triggers_external: AtomicU64,
    hangs_by_datapath: [AtomicU64; 9],
    warm_reset_attempts: AtomicU64,
    warm_reset_completions: AtomicU64,
    cold_reset_escalations: AtomicU64,
    cold_resets_issued: AtomicU64,
    stop_timeouts: AtomicU64,
    resume_timeouts: AtomicU64,
    stop_failures: AtomicU64,
    resume_failures: AtomicU64,
    drain_timeouts: AtomicU64,
    offload_idle_timeouts: AtomicU64,
    outcomes_succeeded: AtomicU64,
    outcomes_escalated: AtomicU64,
    outcomes_failed: AtomicU64,
    config_mismatches: AtomicU64,
    events_fq_empty: AtomicU64,
    events_tso_fail: AtomicU64,
    events_tso_illegal: AtomicU64,
    events_tso_align: AtomicU64,
    events_rfifo_overflow: AtomicU64,
    events_rfifo_underflow: AtomicU64,
    events_force: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl RecoveryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a run starting for `cause`.
    pub fn record_run_started(&self, cause: RecoveryCause) {
        bump(&self.runs_total);
        match cause {
            RecoveryCause::HangDetected(id) => {
                bump(&self.triggers_hang);
                bump(&self.hangs_by_datapath[id.index()]);
                bump(&self.events_force);
            }
            RecoveryCause::Manual => {
                bump(&self.triggers_manual);
                bump(&self.events_force);
            }
            RecoveryCause::ExternalTrigger => bump(&self.triggers_external),
        }
    }

    /// Record asserted frame-engine error events.
    pub fn record_error_events(&self, events: &ErrorEvents) {
        let pairs = [
            (events.fq_empty, &self.events_fq_empty),
            (events.tso_fail, &self.events_tso_fail),
            (events.tso_illegal, &self.events_tso_illegal),
            (events.tso_align, &self.events_tso_align),
            (events.rfifo_overflow, &self.events_rfifo_overflow),
            (events.rfifo_underflow, &self.events_rfifo_underflow),
        ];
        for (asserted, counter) in pairs {
            if asserted {
                bump(counter);
            }
        }
    }

    pub fn record_warm_attempt(&self) {
        bump(&self.warm_reset_attempts);
    }

    pub fn record_warm_completion(&self) {
        bump(&self.warm_reset_completions);
    }

    /// Record the warm tier giving up in favour of the cold tier.
    pub fn record_cold_escalation(&self) {
        bump(&self.cold_reset_escalations);
    }

    pub fn record_cold_reset(&self) {
        bump(&self.cold_resets_issued);
    }

    pub fn record_rendezvous_timeout(&self, phase: Phase) {
        match phase {
            Phase::Stop => bump(&self.stop_timeouts),
            Phase::Resume => bump(&self.resume_timeouts),
        }
    }

    pub fn record_rendezvous_failure(&self, phase: Phase) {
        match phase {
            Phase::Stop => bump(&self.stop_failures),
            Phase::Resume => bump(&self.resume_failures),
        }
    }

    pub fn record_drain_timeout(&self) {
        bump(&self.drain_timeouts);
    }

    pub fn record_offload_idle_timeout(&self) {
        bump(&self.offload_idle_timeouts);
    }

    /// Record how a run ended.
    pub fn record_outcome(&self, outcome: &RecoveryOutcome) {
        match outcome {
            RecoveryOutcome::Succeeded => bump(&self.outcomes_succeeded),
            RecoveryOutcome::SucceededAfterEscalation {
                config_mismatch, ..
            } => {
                bump(&self.outcomes_escalated);
                if *config_mismatch {
                    bump(&self.config_mismatches);
                }
            }
            RecoveryOutcome::Failed(_) => bump(&self.outcomes_failed),
        }
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> CountersSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountersSnapshot {
            runs_total: load(&self.runs_total),
            triggers_hang: load(&self.triggers_hang),
            triggers_manual: load(&self.triggers_manual),
            triggers_external: load(&self.triggers_external),
            hangs_by_datapath: std::array::from_fn(|i| load(&self.hangs_by_datapath[i])),
            warm_reset_attempts: load(&self.warm_reset_attempts),
            warm_reset_completions: load(&self.warm_reset_completions),
            cold_reset_escalations: load(&self.cold_reset_escalations),
            cold_resets_issued: load(&self.cold_resets_issued),
            stop_timeouts: load(&self.stop_timeouts),
            resume_timeouts: load(&self.resume_timeouts),
            stop_failures: load(&self.stop_failures),
            resume_failures: load(&self.resume_failures),
            drain_timeouts: load(&self.drain_timeouts),
            offload_idle_timeouts: load(&self.offload_idle_timeouts),
            outcomes_succeeded: load(&self.outcomes_succeeded),
            outcomes_escalated: load(&self.outcomes_escalated),
            outcomes_failed: load(&self.outcomes_failed),
            config_mismatches: load(&self.config_mismatches),
            events_fq_empty: load(&self.events_fq_empty),
            events_tso_fail: load(&self.events_tso_fail),
            events_tso_illegal: load(&self.events_tso_illegal),
            events_tso_align: load(&self.events_tso_align),
            events_rfifo_overflow: load(&self.events_rfifo_overflow),
            events_rfifo_underflow: load(&self.events_rfifo_underflow),
            events_force: load(&self.events_force),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        let all = [
            &self.runs_total,
            &self.triggers_hang,
            &self.triggers_manual,
            &self.triggers_external,
            &self.warm_reset_attempts,
            &self.warm_reset_completions,
            &self.cold_reset_escalations,
            &self.cold_resets_issued,
            &self.stop_timeouts,
            &self.resume_timeouts,
            &self.stop_failures,
            &self.resume_failures,
            &self.drain_timeouts,
            &self.offload_idle_timeouts,
            &self.outcomes_succeeded,
            &self.outcomes_escalated,
            &self.outcomes_failed,
            &self.config_mismatches,
            &self.events_fq_empty,
            &self.events_tso_fail,
            &self.events_tso_illegal,
            &self.events_tso_align,
            &self.events_rfifo_overflow,
            &self.events_rfifo_underflow,
            &self.events_force,
        ];
        for counter in all.into_iter().chain(self.hangs_by_datapath.iter()) {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_started_counts_cause() {
        let counters = RecoveryCounters::new();
        counters.record_run_started(RecoveryCause::HangDetected(DatapathId::QdmaRx));
        counters.record_run_started(RecoveryCause::Manual);
        counters.record_run_started(RecoveryCause::ExternalTrigger);

        let snap = counters.snapshot();
        assert_eq!(snap.runs_total, 3);
        assert_eq!(snap.triggers_hang, 1);
        assert_eq!(snap.triggers_manual, 1);
        assert_eq!(snap.triggers_external, 1);
        assert_eq!(snap.hangs(DatapathId::QdmaRx), 1);
        assert_eq!(snap.events_force, 2);
    }

    #[test]
    fn test_error_events_counted_per_kind() {
        let counters = RecoveryCounters::new();
        counters.record_error_events(&ErrorEvents {
            fq_empty: true,
            rfifo_underflow: true,
            ..Default::default()
        });
        let snap = counters.snapshot();
        assert_eq!(snap.events_fq_empty, 1);
        assert_eq!(snap.events_rfifo_underflow, 1);
        assert_eq!(snap.events_tso_fail, 0);
    }

    #[test]
    fn test_outcome_counters() {
        let counters = RecoveryCounters::new();
        counters.record_outcome(&RecoveryOutcome::Succeeded);
        counters.record_outcome(&RecoveryOutcome::SucceededAfterEscalation {
            escalations: 0,
            config_mismatch: true,
        });
        let snap = counters.snapshot();
        assert_eq!(snap.outcomes_succeeded, 1);
        assert_eq!(snap.outcomes_escalated, 1);
        assert_eq!(snap.config_mismatches, 1);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let counters = RecoveryCounters::new();
        counters.record_run_started(RecoveryCause::HangDetected(DatapathId::GdmTx));
        counters.record_warm_attempt();
        counters.record_rendezvous_timeout(Phase::Stop);
        counters.record_rendezvous_failure(Phase::Resume);

        counters.reset();
        assert_eq!(counters.snapshot(), CountersSnapshot::default());
    }

    #[test]
    fn test_entries_cover_every_datapath() {
        let entries = CountersSnapshot::default().entries();
        for id in DatapathId::ALL {
            assert!(entries.iter().any(|(name, _)| *name == id.as_str()));
        }
    }
}

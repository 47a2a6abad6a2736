//! Periodic hang sampling.
//!
//! Each tick samples every enabled detector under a shared read guard on the
//! register port and, if a datapath is confirmed hung, offers a recovery
//! request to the [`RecoveryLock`]. Ticks are skipped while a run holds the
//! lock: the orchestrator owns the registers for the duration of the run.

use super::config::MonitorConfig;
use crate::control::{AutoRecovery, ControlSurface};
use crate::datapath::{DatapathId, DetectorBank};
use crate::port::SharedPort;
use crate::recovery::{RecoveryLock, RecoveryRequest, RecoveryScope, Submission};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one monitor tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// No sampling happened because recovery owns the registers.
    pub skipped: bool,
    /// Every datapath that reported stale, in priority order.
    pub stale: Vec<DatapathId>,
    /// Datapath whose hang determined the request.
    pub fired: Option<DatapathId>,
    pub scope: Option<RecoveryScope>,
    /// `None` when auto-recovery withheld the request.
    pub submission: Option<Submission>,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Samples the detectors on a fixed cadence and requests recovery.
pub struct HangMonitor {
    port: SharedPort,
    bank: DetectorBank,
    control: Arc<ControlSurface>,
    lock: RecoveryLock,
    interval: Duration,
}

impl HangMonitor {
    pub fn new(
        port: SharedPort,
        bank: DetectorBank,
        control: Arc<ControlSurface>,
        lock: RecoveryLock,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            port,
            bank,
            control,
            lock,
            interval: config.tick_interval,
        }
    }

    /// Runs ticks until cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            detectors = self.bank.enabled().len(),
            "Hang monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        info!("Hang monitor stopped");
    }

    /// Samples once and acts on the first stale datapath.
    pub fn tick(&self) -> TickReport {
        if self.lock.is_held() {
            debug!("Recovery in progress, tick skipped");
            return TickReport::skipped();
        }
        let Some(access) = self.port.try_sample_access() else {
            debug!("Register port busy, tick skipped");
            return TickReport::skipped();
        };
        let verdict = self.bank.sample_all(self.port.port());
        drop(access);

        let stale = verdict.stale();
        let Some(fired) = verdict.first_stale() else {
            return TickReport {
                stale,
                ..Default::default()
            };
        };
        let scope = fired.requested_scope();

        // ArmedOnce is only spent on a request that adds something.
        let submission = match self.control.auto_recovery() {
            AutoRecovery::Disabled => None,
            _ => self.lock.submit_if(RecoveryRequest::hang(fired), || {
                self.control.take_auto_permit()
            }),
        };
        let Some(submission) = submission else {
            debug!(
                datapath = %fired,
                %scope,
                auto_recovery = self.control.auto_recovery().as_str(),
                "Hang present, auto-recovery withheld"
            );
            return TickReport {
                skipped: false,
                stale,
                fired: Some(fired),
                scope: Some(scope),
                submission: None,
            };
        };

        match submission {
            Submission::Queued | Submission::Merged => warn!(
                datapath = %fired,
                %scope,
                also_stale = stale.len() - 1,
                "Recovery requested for hung datapath"
            ),
            Submission::Escalated | Submission::Dropped => debug!(
                datapath = %fired,
                ?submission,
                "Recovery request folded into existing one"
            ),
        }

        TickReport {
            skipped: false,
            stale,
            fired: Some(fired),
            scope: Some(scope),
            submission: Some(submission),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::sim::SimulatedEngine;

    struct Fixture {
        engine: Arc<SimulatedEngine>,
        port: SharedPort,
        control: Arc<ControlSurface>,
        lock: RecoveryLock,
        monitor: HangMonitor,
    }

    fn fixture(threshold: u32, disabled: Vec<DatapathId>) -> Fixture {
        let engine = Arc::new(SimulatedEngine::new());
        let port = SharedPort::new(engine.clone());
        let config = MonitorConfig::default()
            .with_hang_threshold(threshold)
            .with_disabled(disabled);
        let bank = DetectorBank::with_config(config.hang_threshold, &config.disabled_datapaths);
        let control = Arc::new(ControlSurface::default());
        let lock = RecoveryLock::new();
        let monitor = HangMonitor::new(
            port.clone(),
            bank,
            Arc::clone(&control),
            lock.clone(),
            &config,
        );
        Fixture {
            engine,
            port,
            control,
            lock,
            monitor,
        }
    }

    /// Ticks until a datapath fires, returning the firing report.
    fn tick_until_fired(monitor: &HangMonitor, max: usize) -> Option<(usize, TickReport)> {
        (1..=max)
            .map(|n| (n, monitor.tick()))
            .find(|(_, report)| report.fired.is_some())
    }

    #[test]
    fn test_healthy_engine_never_fires() {
        let f = fixture(2, vec![]);
        for _ in 0..10 {
            let report = f.monitor.tick();
            assert!(!report.skipped);
            assert!(report.fired.is_none());
        }
        assert!(f.lock.pending().is_none());
    }

    #[test]
    fn test_hang_fires_after_threshold_and_queues_request() {
        let f = fixture(3, vec![]);
        f.engine.inject_hang(DatapathId::QdmaTx);

        // First tick records the baseline, then three stale ticks.
        let (ticks, report) = tick_until_fired(&f.monitor, 10).unwrap();
        assert_eq!(ticks, 4);
        assert_eq!(report.fired, Some(DatapathId::QdmaTx));
        assert_eq!(report.scope, Some(RecoveryScope::StopTraffic));
        assert_eq!(report.submission, Some(Submission::Queued));
        assert_eq!(f.lock.pending(), Some(RecoveryRequest::hang(DatapathId::QdmaTx)));
    }

    #[test]
    fn test_first_stale_in_priority_order_wins() {
        let f = fixture(1, vec![]);
        f.engine.inject_hang(DatapathId::GdmRx);
        f.engine.inject_hang(DatapathId::QdmaRx);

        let (_, report) = tick_until_fired(&f.monitor, 5).unwrap();
        assert_eq!(report.fired, Some(DatapathId::QdmaRx));
        assert_eq!(report.stale, vec![DatapathId::QdmaRx, DatapathId::GdmRx]);
    }

    #[test]
    fn test_repeated_hang_is_dropped_while_pending() {
        let f = fixture(1, vec![]);
        f.engine.inject_hang(DatapathId::QdmaTx);
        tick_until_fired(&f.monitor, 5).unwrap();

        let report = f.monitor.tick();
        assert_eq!(report.submission, Some(Submission::Dropped));
    }

    #[test]
    fn test_disabled_auto_recovery_logs_only() {
        let f = fixture(1, vec![]);
        f.control.set_auto_recovery(AutoRecovery::Disabled);
        f.engine.inject_hang(DatapathId::WdmaTx);

        let (_, report) = tick_until_fired(&f.monitor, 5).unwrap();
        assert_eq!(report.submission, None);
        assert!(f.lock.pending().is_none());
    }

    #[test]
    fn test_armed_once_fires_once_then_disables() {
        let f = fixture(1, vec![]);
        f.control.set_auto_recovery(AutoRecovery::ArmedOnce);
        f.engine.inject_hang(DatapathId::WdmaTx);

        let (_, report) = tick_until_fired(&f.monitor, 5).unwrap();
        assert_eq!(report.submission, Some(Submission::Queued));
        assert_eq!(f.control.auto_recovery(), AutoRecovery::Disabled);

        assert_eq!(f.monitor.tick().submission, None);
    }

    #[test]
    fn test_armed_once_survives_duplicate_of_pending_request() {
        let f = fixture(1, vec![]);
        f.lock.submit(RecoveryRequest::hang(DatapathId::QdmaTx));
        f.control.set_auto_recovery(AutoRecovery::ArmedOnce);
        f.engine.inject_hang(DatapathId::TdmaTx);

        let (_, report) = tick_until_fired(&f.monitor, 5).unwrap();
        assert_eq!(report.fired, Some(DatapathId::TdmaTx));
        assert_eq!(report.submission, Some(Submission::Dropped));
        assert_eq!(f.control.auto_recovery(), AutoRecovery::ArmedOnce);

        // A wider hang still gets the one permit.
        f.engine.clear_hang(DatapathId::TdmaTx);
        f.engine.inject_hang(DatapathId::GdmRx);
        let (_, report) = tick_until_fired(&f.monitor, 5).unwrap();
        assert_eq!(report.fired, Some(DatapathId::GdmRx));
        assert_eq!(report.submission, Some(Submission::Merged));
        assert_eq!(f.control.auto_recovery(), AutoRecovery::Disabled);
        assert_eq!(f.lock.pending().unwrap().scope, RecoveryScope::FullReset);
    }

    #[test]
    fn test_disabled_datapath_is_ignored() {
        let f = fixture(1, vec![DatapathId::TdmaTx]);
        f.engine.inject_hang(DatapathId::TdmaTx);
        assert!(tick_until_fired(&f.monitor, 6).is_none());
    }

    #[test]
    fn test_tick_skipped_while_run_holds_lock() {
        let f = fixture(1, vec![]);
        f.lock.submit(RecoveryRequest::manual(RecoveryScope::FullReset, false));
        let _guard = f.lock.try_acquire().unwrap();
        f.engine.inject_hang(DatapathId::QdmaTx);

        for _ in 0..5 {
            assert!(f.monitor.tick().skipped);
        }
    }

    #[tokio::test]
    async fn test_tick_skipped_while_port_is_exclusive() {
        let f = fixture(1, vec![]);
        let _exclusive = f.port.exclusive().await;
        assert!(f.monitor.tick().skipped);
    }

    #[tokio::test]
    async fn test_monitor_stops_on_cancellation() {
        let f = fixture(1, vec![]);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let result =
            tokio::time::timeout(Duration::from_millis(100), f.monitor.run(shutdown)).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_submits_within_threshold_ticks() {
        let f = fixture(2, vec![]);
        let lock = f.lock.clone();
        f.engine.inject_hang(DatapathId::GdmTx);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(f.monitor.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(1_600)).await;
        shutdown.cancel();
        task.await.unwrap();

        // Ticks at 0, 500, 1000 ms: baseline then two stale samples.
        let pending = lock.pending().unwrap();
        assert_eq!(pending.scope, RecoveryScope::FullReset);
    }
}

//! Controller service facade.
//!
//! Wires the components around one register port and runs them as three
//! background tasks:
//!
//! ```text
//!   AcceleratorLink ──events──► event pump ──► AcceleratorRegistry
//!                                                   ▲
//!   HangMonitor ──submit──► RecoveryLock ──next──► RecoveryOrchestrator
//!        ▲                       ▲                       │
//!        └── ControlSurface      └── ServiceHandle       └──► reports
//! ```

use super::config::ServiceConfig;
use super::error::ServiceError;
use crate::control::{ControlCommand, ControlSurface};
use crate::datapath::{DatapathId, DetectorBank};
use crate::monitor::HangMonitor;
use crate::port::{RegisterPort, SharedPort};
use crate::recovery::{
    CountersSnapshot, RecoveryCounters, RecoveryLock, RecoveryOrchestrator, RecoveryReport,
    RecoveryRequest, RecoveryScope, RecoveryState, Submission,
};
use crate::rendezvous::{run_event_pump, AcceleratorId, AcceleratorLink, AcceleratorRegistry, PhaseNotice};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Entry point for starting the controller.
pub struct NetsysService;

impl NetsysService {
    /// Starts the controller against `port`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        port: Arc<dyn RegisterPort>,
        config: ServiceConfig,
    ) -> Result<ServiceHandle, ServiceError> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| ServiceError::RuntimeError(e.to_string()))?;

        info!(
            auto_recovery = config.auto_recovery.as_str(),
            verbosity = config.verbosity.as_str(),
            tick_ms = config.monitor.tick_interval.as_millis() as u64,
            hang_threshold = config.monitor.hang_threshold,
            "Starting frame engine recovery service"
        );

        let port = SharedPort::new(port);
        let registry = Arc::new(AcceleratorRegistry::new());
        let bank = DetectorBank::with_config(
            config.monitor.hang_threshold,
            &config.monitor.disabled_datapaths,
        );
        let control = Arc::new(ControlSurface::new(config.auto_recovery, config.verbosity));
        let counters = Arc::new(RecoveryCounters::new());
        let lock = RecoveryLock::new();
        let shutdown = CancellationToken::new();

        let orchestrator = RecoveryOrchestrator::new(
            port.clone(),
            Arc::clone(&registry),
            bank.clone(),
            Arc::clone(&control),
            Arc::clone(&counters),
            lock.clone(),
            config.recovery.clone(),
        );
        let state = orchestrator.state();
        let reports = orchestrator.report_sender();

        let monitor = HangMonitor::new(
            port,
            bank.clone(),
            Arc::clone(&control),
            lock.clone(),
            &config.monitor,
        );

        let (link, events) = AcceleratorLink::channel();

        let tasks = vec![
            (
                "event-pump",
                tokio::spawn(run_event_pump(Arc::clone(&registry), events, shutdown.clone())),
            ),
            ("orchestrator", tokio::spawn(orchestrator.run(shutdown.clone()))),
            ("hang-monitor", tokio::spawn(monitor.run(shutdown.clone()))),
        ];

        info!("Frame engine recovery service started");

        Ok(ServiceHandle {
            lock,
            control,
            counters,
            registry,
            bank,
            link,
            reports,
            state,
            shutdown,
            tasks,
        })
    }
}

/// Handle to a running service.
pub struct ServiceHandle {
    lock: RecoveryLock,
    control: Arc<ControlSurface>,
    counters: Arc<RecoveryCounters>,
    registry: Arc<AcceleratorRegistry>,
    bank: DetectorBank,
    link: AcceleratorLink,
    reports: broadcast::Sender<RecoveryReport>,
    state: watch::Receiver<RecoveryState>,
    shutdown: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ServiceHandle {
    /// Requests an operator-initiated recovery run.
    pub fn request_recovery(&self, scope: RecoveryScope, cold_reset: bool) -> Submission {
        self.submit(RecoveryRequest::manual(scope, cold_reset))
    }

    /// Requests a recovery run on behalf of another driver.
    pub fn request_external(&self, scope: RecoveryScope, cold_reset: bool) -> Submission {
        self.submit(RecoveryRequest::external(scope, cold_reset))
    }

    fn submit(&self, request: RecoveryRequest) -> Submission {
        let submission = self.lock.submit(request);
        info!(
            cause = %request.cause,
            scope = %request.scope,
            cold_reset = request.cold_reset,
            ?submission,
            "Recovery requested"
        );
        submission
    }

    /// Applies a decoded operator command.
    ///
    /// Returns the submission outcome for recovery requests.
    pub fn apply_control(&self, command: ControlCommand) -> Option<Submission> {
        match command {
            ControlCommand::SetAutoRecovery(mode) => {
                self.control.set_auto_recovery(mode);
                info!(auto_recovery = mode.as_str(), "Auto-recovery policy changed");
                None
            }
            ControlCommand::SetVerbosity(verbosity) => {
                self.control.set_verbosity(verbosity);
                info!(verbosity = verbosity.as_str(), "Diagnostics verbosity changed");
                None
            }
            ControlCommand::RequestRecovery { scope, cold_reset } => {
                Some(self.request_recovery(scope, cold_reset))
            }
        }
    }

    /// Link for the accelerator transport to report unit events.
    pub fn accelerator_link(&self) -> AcceleratorLink {
        self.link.clone()
    }

    /// Phase notices the accelerator transport must forward to its units.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<PhaseNotice> {
        self.registry.subscribe()
    }

    pub fn accelerators_online(&self) -> Vec<AcceleratorId> {
        self.registry.online()
    }

    pub fn control(&self) -> Arc<ControlSurface> {
        Arc::clone(&self.control)
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    pub fn reset_counters(&self) {
        self.counters.reset();
    }

    /// Current consecutive-stale count for every detector.
    pub fn stale_counts(&self) -> Vec<(DatapathId, u32)> {
        self.bank.stale_counts()
    }

    /// Reports of runs finishing after this call.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<RecoveryReport> {
        self.reports.subscribe()
    }

    pub fn state(&self) -> RecoveryState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RecoveryState> {
        self.state.clone()
    }

    /// Stops all tasks and waits for them.
    ///
    /// A run in flight is finished first; the orchestrator only checks for
    /// shutdown between runs.
    pub async fn shutdown(mut self) -> Result<(), ServiceError> {
        info!("Shutting down frame engine recovery service");
        self.shutdown.cancel();

        let mut failure = None;
        for (task, handle) in self.tasks.drain(..) {
            if let Err(e) = handle.await {
                error!(task, error = %e, "Service task failed");
                failure.get_or_insert(ServiceError::TaskFailed {
                    task,
                    reason: e.to_string(),
                });
            }
        }

        info!("Frame engine recovery service stopped");
        failure.map_or(Ok(()), Err)
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::AutoRecovery;
    use crate::monitor::MonitorConfig;
    use crate::port::sim::SimulatedEngine;
    use crate::recovery::{RecoveryConfig, RecoveryOutcome};
    use std::time::Duration;

    fn fast_config() -> ServiceConfig {
        ServiceConfig::default()
            .with_monitor(
                MonitorConfig::default()
                    .with_tick_interval(Duration::from_millis(10))
                    .with_hang_threshold(2),
            )
            .with_recovery(
                RecoveryConfig::default()
                    .with_rendezvous_timeouts(Duration::from_millis(50), Duration::from_millis(50))
                    .with_reset_timeouts(Duration::from_millis(20), Duration::from_millis(20)),
            )
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let engine = Arc::new(SimulatedEngine::new());
        let result = NetsysService::start(engine, ServiceConfig::default());
        assert!(matches!(result, Err(ServiceError::RuntimeError(_))));
    }

    #[tokio::test]
    async fn test_manual_request_runs_and_reports() {
        let engine = Arc::new(SimulatedEngine::new());
        let handle = NetsysService::start(engine, fast_config()).unwrap();
        let mut reports = handle.subscribe_reports();

        assert_eq!(
            handle.request_recovery(RecoveryScope::StopTraffic, false),
            Submission::Queued
        );
        let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.outcome, RecoveryOutcome::Succeeded);
        assert_eq!(handle.counters().triggers_manual, 1);
        assert_eq!(handle.state(), RecoveryState::Idle);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_control_commands_update_policy() {
        let engine = Arc::new(SimulatedEngine::new());
        let handle = NetsysService::start(engine, fast_config()).unwrap();

        let result = handle.apply_control(ControlCommand::from_level(0).unwrap());
        assert_eq!(result, None);
        assert_eq!(handle.control().auto_recovery(), AutoRecovery::Disabled);

        handle.apply_control(ControlCommand::from_level(4).unwrap());
        assert_eq!(
            handle.control().verbosity(),
            crate::control::DiagnosticsVerbosity::Dump
        );

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_counters() {
        let engine = Arc::new(SimulatedEngine::new());
        let handle = NetsysService::start(engine, fast_config()).unwrap();
        let mut reports = handle.subscribe_reports();

        handle.request_external(RecoveryScope::FullReset, true);
        tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.counters().triggers_external, 1);

        handle.reset_counters();
        assert_eq!(handle.counters(), CountersSnapshot::default());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_is_prompt_when_idle() {
        let engine = Arc::new(SimulatedEngine::new());
        let handle = NetsysService::start(engine, fast_config()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle.shutdown()).await;
        assert!(result.unwrap().is_ok());
    }
}

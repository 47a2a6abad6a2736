//! The recovery state machine.
//!
//! # Run sequence
//!
//! ```text
//! Idle
//!  -> Quiescing       snapshot, offload engines idle, ports closed, queues drained
//!  -> ExternalStop    DMA and interrupts off, accelerators stop
//!  -> Resetting       warm reset, cold on timeout (exclusive register access)
//!  -> ExternalResume  interrupts and DMA on, accelerators resume
//!  -> Reattaching     snapshot restored and verified, ports reopened, detectors rearmed
//!  -> Idle
//! ```
//!
//! Any fatal error moves the run to `Aborting` and then back to `Idle`.
//! Fatal means: the snapshot could not be taken, a register operation failed
//! while taking the engine down or resetting it, or the cold reset never
//! completed. Only the last one disables auto-recovery and leaves the engine
//! as it is; every other abort reopens whatever the run had closed.
//! Restore failures while reattaching are not fatal: they are reported as a
//! configuration mismatch and the remaining ports are still reopened.
//!
//! Escalation is monotonic within a run. The reset tier only moves warm to
//! cold, the scope only moves stop-traffic to full-reset, and each
//! rendezvous phase is re-broadcast at most `rendezvous_retry_limit` times.

use super::config::{RecoveryConfig, REPORT_CHANNEL_CAPACITY};
use super::counters::RecoveryCounters;
use super::lock::{RecoveryLock, RecoveryLockGuard};
use super::outcome::{FailureReason, RecoveryOutcome, RecoveryReport, RunStats};
use super::request::{RecoveryRequest, RecoveryScope};
use super::state::RecoveryState;
use crate::control::{AutoRecovery, ControlSurface, DiagnosticsVerbosity};
use crate::datapath::DetectorBank;
use crate::port::{PortError, PortId, PortState, ResetHandle, ResetTier, SharedPort};
use crate::rendezvous::{AcceleratorRegistry, Phase, PhaseResult};
use crate::snapshot::ConfigSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mutable state of the run in flight.
#[derive(Debug)]
struct RunContext {
    request: RecoveryRequest,
    scope: RecoveryScope,
    cold_reset: bool,
    tier: Option<ResetTier>,
    stats: RunStats,
    snapshot: Option<ConfigSnapshot>,
    /// Ports closed so far, with the state to put back.
    closed_ports: Vec<(PortId, PortState)>,
    engine_stopped: bool,
    accelerators_stopped: bool,
}

impl RunContext {
    fn new(request: RecoveryRequest) -> Self {
        Self {
            request,
            scope: request.scope,
            cold_reset: request.cold_reset,
            tier: None,
            stats: RunStats::default(),
            snapshot: None,
            closed_ports: Vec::new(),
            engine_stopped: false,
            accelerators_stopped: false,
        }
    }
}

fn port_failure(state: RecoveryState) -> impl FnOnce(PortError) -> FailureReason {
    move |source| FailureReason::Port { state, source }
}

/// Polls `check` until it returns true or `timeout` passes.
///
/// Returns within `timeout` plus one `interval`.
async fn poll_until<F>(timeout: Duration, interval: Duration, mut check: F) -> Result<bool, PortError>
where
    F: FnMut() -> Result<bool, PortError>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check()? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Drives recovery runs, one at a time.
pub struct RecoveryOrchestrator {
    port: SharedPort,
    registry: Arc<AcceleratorRegistry>,
    bank: DetectorBank,
    control: Arc<ControlSurface>,
    counters: Arc<RecoveryCounters>,
    lock: RecoveryLock,
    config: RecoveryConfig,
    state_tx: watch::Sender<RecoveryState>,
    reports: broadcast::Sender<RecoveryReport>,
}

impl RecoveryOrchestrator {
    pub fn new(
        port: SharedPort,
        registry: Arc<AcceleratorRegistry>,
        bank: DetectorBank,
        control: Arc<ControlSurface>,
        counters: Arc<RecoveryCounters>,
        lock: RecoveryLock,
        config: RecoveryConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(RecoveryState::Idle);
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            port,
            registry,
            bank,
            control,
            counters,
            lock,
            config,
            state_tx,
            reports,
        }
    }

    /// Watches the current state.
    pub fn state(&self) -> watch::Receiver<RecoveryState> {
        self.state_tx.subscribe()
    }

    /// Sender side of the report channel, for handing out subscriptions.
    pub fn report_sender(&self) -> broadcast::Sender<RecoveryReport> {
        self.reports.clone()
    }

    /// Serves requests from the lock until cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Recovery orchestrator started");
        while let Some(guard) = self.lock.next(&shutdown).await {
            self.execute(guard).await;
        }
        info!("Recovery orchestrator stopped");
    }

    /// Runs one recovery for the request held by `guard` and releases it.
    pub async fn execute(&self, guard: RecoveryLockGuard) -> RecoveryReport {
        let started = Instant::now();
        let mut run = RunContext::new(guard.request());

        info!(
            cause = %run.request.cause,
            scope = %run.scope,
            cold_reset = run.cold_reset,
            "Recovery run started"
        );
        self.counters.record_run_started(run.request.cause);
        self.census();

        let outcome = match self.drive(&guard, &mut run).await {
            Ok(()) => {
                let escalations = run.stats.escalations();
                if escalations > 0 || run.stats.config_mismatch {
                    RecoveryOutcome::SucceededAfterEscalation {
                        escalations,
                        config_mismatch: run.stats.config_mismatch,
                    }
                } else {
                    RecoveryOutcome::Succeeded
                }
            }
            Err(reason) => {
                self.abort(&reason, &mut run).await;
                RecoveryOutcome::Failed(reason)
            }
        };

        let duration = started.elapsed();
        self.counters.record_outcome(&outcome);
        let report = RecoveryReport {
            request: run.request,
            scope: run.scope,
            reset_tier: run.tier,
            outcome,
            stats: run.stats,
            duration,
        };

        self.enter(RecoveryState::Idle);
        drop(guard);

        info!(
            outcome = report.outcome.as_str(),
            scope = %report.scope,
            reset_tier = ?report.reset_tier,
            elapsed_ms = duration.as_millis() as u64,
            "Recovery run finished"
        );
        // No subscribers is fine.
        let _ = self.reports.send(report.clone());
        report
    }

    // =========================================================================
    // Run stages
    // =========================================================================

    async fn drive(
        &self,
        guard: &RecoveryLockGuard,
        run: &mut RunContext,
    ) -> Result<(), FailureReason> {
        let port = self.port.port();

        // Quiescing
        self.enter(RecoveryState::Quiescing);
        self.checkpoint(guard, run);
        let snapshot = ConfigSnapshot::capture(port).map_err(FailureReason::SnapshotCapture)?;
        debug!(queues = snapshot.len(), "Queue configuration captured");
        run.snapshot = Some(snapshot);
        self.quiesce_offload(run)
            .await
            .map_err(port_failure(RecoveryState::Quiescing))?;
        self.close_ports(run)
            .map_err(port_failure(RecoveryState::Quiescing))?;
        self.drain(run)
            .await
            .map_err(port_failure(RecoveryState::Quiescing))?;

        // ExternalStop
        self.enter(RecoveryState::ExternalStop);
        self.checkpoint(guard, run);
        run.engine_stopped = true;
        port.set_engine_dma_enabled(false)
            .and_then(|()| port.set_interrupts_enabled(false))
            .map_err(port_failure(RecoveryState::ExternalStop))?;
        run.accelerators_stopped = true;
        self.rendezvous(Phase::Stop, run).await?;

        // Resetting
        self.enter(RecoveryState::Resetting);
        self.checkpoint(guard, run);
        {
            let _exclusive = self.port.exclusive().await;
            self.reset(run).await?;
        }

        // ExternalResume
        self.enter(RecoveryState::ExternalResume);
        self.checkpoint(guard, run);
        port.set_interrupts_enabled(true)
            .and_then(|()| port.set_engine_dma_enabled(true))
            .map_err(port_failure(RecoveryState::ExternalResume))?;
        run.engine_stopped = false;
        self.rendezvous(Phase::Resume, run).await?;
        run.accelerators_stopped = false;

        // Reattaching
        self.enter(RecoveryState::Reattaching);
        self.checkpoint(guard, run);
        self.reattach(run);
        self.bank.rearm_all();

        Ok(())
    }

    /// Counts asserted error events and dumps diagnostics if asked to.
    ///
    /// Runs before the snapshot, so failures here are logged, not fatal.
    fn census(&self) {
        let port = self.port.port();
        match port.read_error_events() {
            Ok(events) if !events.is_empty() => {
                info!(?events, "Frame engine error events at recovery start");
                self.counters.record_error_events(&events);
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Error event read failed"),
        }

        if self.control.verbosity() == DiagnosticsVerbosity::Dump {
            if let Err(e) = port.dump_diagnostics() {
                debug!(error = %e, "Diagnostics dump failed");
            }
        }
    }

    async fn quiesce_offload(&self, run: &mut RunContext) -> Result<(), PortError> {
        let port = self.port.port();
        for engine in 0..port.offload_engine_count() {
            port.prepare_offload_engine(engine)?;
            let idle = poll_until(
                self.config.offload_idle_timeout,
                self.config.offload_poll,
                || port.offload_engine_busy(engine).map(|busy| !busy),
            )
            .await?;
            if !idle {
                warn!(
                    engine,
                    timeout_ms = self.config.offload_idle_timeout.as_millis() as u64,
                    "Flow offload engine still busy, proceeding"
                );
                run.stats.offload_idle_timeouts += 1;
                self.counters.record_offload_idle_timeout();
            }
        }
        Ok(())
    }

    /// Closes every port, recording each one's state before touching it.
    fn close_ports(&self, run: &mut RunContext) -> Result<(), PortError> {
        let port = self.port.port();
        for id in port.port_ids() {
            let state = port.read_port_state(id)?;
            run.closed_ports.push((id, state));
            port.set_port_admin_up(id, false)?;
            port.set_ingress_drop(id, true)?;
        }
        debug!(ports = run.closed_ports.len(), "Ports closed");
        Ok(())
    }

    async fn drain(&self, run: &mut RunContext) -> Result<(), PortError> {
        let port = self.port.port();
        let drained = poll_until(self.config.drain_timeout, self.config.drain_poll, || {
            port.output_queue_depth().map(|depth| depth == 0)
        })
        .await?;
        if !drained {
            warn!(
                timeout_ms = self.config.drain_timeout.as_millis() as u64,
                "Output queues did not drain, proceeding"
            );
            run.stats.drain_timed_out = true;
            self.counters.record_drain_timeout();
        }
        Ok(())
    }

    /// Runs one rendezvous phase with the retry-once-then-proceed rule.
    async fn rendezvous(&self, phase: Phase, run: &mut RunContext) -> Result<(), FailureReason> {
        let timeout = match phase {
            Phase::Stop => self.config.stop_timeout,
            Phase::Resume => self.config.resume_timeout,
        };

        self.registry.begin_phase(phase, run.scope)?;
        let mut retries = 0;

        loop {
            match self.registry.await_phase(phase, timeout).await {
                PhaseResult::Completed => break,
                PhaseResult::TimedOut { pending } => {
                    self.counters.record_rendezvous_timeout(phase);
                    match phase {
                        Phase::Stop => run.stats.stop_timeouts += 1,
                        Phase::Resume => run.stats.resume_timeouts += 1,
                    }
                    if retries < self.config.rendezvous_retry_limit {
                        retries += 1;
                        warn!(%phase, pending, retry = retries, "Rendezvous timed out, re-broadcasting");
                        if let Err(e) = self.registry.rebroadcast(phase) {
                            self.registry.end_phase();
                            return Err(e.into());
                        }
                        continue;
                    }
                    warn!(%phase, pending, "Rendezvous timed out again, proceeding without it");
                    run.stats.rendezvous_escalations += 1;
                    break;
                }
                PhaseResult::Failed { id, reason } => {
                    warn!(%phase, accelerator = %id, reason = %reason, "Rendezvous failed, proceeding");
                    self.counters.record_rendezvous_failure(phase);
                    match phase {
                        Phase::Stop => run.stats.stop_failures += 1,
                        Phase::Resume => run.stats.resume_failures += 1,
                    }
                    run.stats.rendezvous_escalations += 1;
                    if phase == Phase::Stop && run.scope < RecoveryScope::FullReset {
                        info!(
                            from = %run.scope,
                            to = %RecoveryScope::FullReset,
                            "Stop failure, widening recovery scope"
                        );
                        run.scope = RecoveryScope::FullReset;
                        run.stats.scope_upgraded = true;
                    }
                    break;
                }
            }
        }

        self.registry.end_phase();
        Ok(())
    }

    /// Issues the reset, escalating warm to cold on timeout.
    async fn reset(&self, run: &mut RunContext) -> Result<(), FailureReason> {
        let port = self.port.port();

        if !run.cold_reset {
            run.tier = Some(ResetTier::Warm);
            run.stats.warm_reset_attempts += 1;
            self.counters.record_warm_attempt();

            let handle = port
                .issue_reset(ResetTier::Warm, run.scope)
                .map_err(port_failure(RecoveryState::Resetting))?;
            let completed = self
                .await_reset(handle, self.config.warm_reset_timeout)
                .await
                .map_err(port_failure(RecoveryState::Resetting))?;
            if completed {
                info!(scope = %run.scope, "Warm reset completed");
                self.counters.record_warm_completion();
                return Ok(());
            }

            warn!(
                timeout_ms = self.config.warm_reset_timeout.as_millis() as u64,
                "Warm reset did not complete, escalating to cold reset"
            );
            run.stats.cold_reset_escalations += 1;
            self.counters.record_cold_escalation();
        }

        run.tier = Some(ResetTier::Cold);
        self.counters.record_cold_reset();
        let handle = port
            .issue_reset(ResetTier::Cold, run.scope)
            .map_err(port_failure(RecoveryState::Resetting))?;
        let completed = self
            .await_reset(handle, self.config.cold_reset_timeout)
            .await
            .map_err(port_failure(RecoveryState::Resetting))?;
        if completed {
            info!(scope = %run.scope, "Cold reset completed");
            Ok(())
        } else {
            Err(FailureReason::ColdResetTimeout)
        }
    }

    async fn await_reset(&self, handle: ResetHandle, timeout: Duration) -> Result<bool, PortError> {
        let port = self.port.port();
        poll_until(timeout, self.config.reset_poll, || {
            port.poll_reset_complete(handle)
        })
        .await
    }

    /// Restores queue and port configuration.
    ///
    /// A restore that fails or reads back differently is reported as a
    /// configuration mismatch; the engine itself is already serving traffic
    /// and every port is still reopened.
    fn reattach(&self, run: &mut RunContext) {
        let port = self.port.port();

        if let Some(snapshot) = &run.snapshot {
            match snapshot
                .restore(port)
                .and_then(|()| ConfigSnapshot::capture(port))
            {
                Ok(after) => {
                    let diffs = snapshot.diff(&after);
                    if !diffs.is_empty() {
                        warn!(
                            queues = ?diffs.iter().map(|d| d.queue).collect::<Vec<_>>(),
                            "Queue configuration differs after restore"
                        );
                        run.stats.config_mismatch = true;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Queue configuration restore failed");
                    run.stats.config_mismatch = true;
                }
            }
        }

        if !self.reopen_ports(&run.closed_ports) {
            run.stats.config_mismatch = true;
        }
    }

    /// Puts every closed port back the way it was found.
    ///
    /// Each step is attempted for every port regardless of earlier failures.
    /// Returns false if any step failed.
    fn reopen_ports(&self, ports: &[(PortId, PortState)]) -> bool {
        let port = self.port.port();
        let mut clean = true;

        for (id, state) in ports {
            if let Err(e) = port.restore_link_config(*id, &state.link) {
                warn!(port = %id, error = %e, "Link configuration restore failed");
                clean = false;
            }
            if let Err(e) = port.set_ingress_drop(*id, state.ingress_drop) {
                warn!(port = %id, error = %e, "Ingress reopen failed");
                clean = false;
            }
            if state.admin_up {
                if let Err(e) = port.set_port_admin_up(*id, true) {
                    warn!(port = %id, error = %e, "Port admin-up failed");
                    clean = false;
                }
            }
        }
        clean
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn enter(&self, state: RecoveryState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "Recovery state transition");
        }
    }

    /// Applies escalations submitted since the last checkpoint.
    ///
    /// Escalations arriving once a reset tier has been issued cannot change
    /// this run and are only logged.
    fn checkpoint(&self, guard: &RecoveryLockGuard, run: &mut RunContext) {
        let Some(upgrade) = guard.take_upgrade() else {
            return;
        };

        if run.tier.is_some() {
            info!(
                scope = %upgrade.scope,
                cold_reset = upgrade.cold_reset,
                "Escalation arrived after reset, ignored"
            );
            return;
        }

        if upgrade.scope > run.scope || (upgrade.cold_reset && !run.cold_reset) {
            info!(
                from = %run.scope,
                to = %upgrade.scope.max(run.scope),
                cold_reset = upgrade.cold_reset || run.cold_reset,
                "Recovery run escalated"
            );
            run.scope = run.scope.max(upgrade.scope);
            run.cold_reset |= upgrade.cold_reset;
            run.stats.scope_upgraded = true;
        }
    }

    async fn abort(&self, reason: &FailureReason, run: &mut RunContext) {
        self.enter(RecoveryState::Aborting);
        self.registry.end_phase();

        if matches!(reason, FailureReason::ColdResetTimeout) {
            self.control.set_auto_recovery(AutoRecovery::Disabled);
            error!(
                error = %reason,
                "Recovery aborted, auto-recovery disabled until re-enabled by an operator"
            );
            return;
        }

        error!(error = %reason, "Recovery aborted, reopening the engine");
        self.reopen(run).await;
    }

    /// Best-effort undo of the steps an aborted run had taken.
    async fn reopen(&self, run: &mut RunContext) {
        let port = self.port.port();

        if run.engine_stopped {
            if let Err(e) = port.set_interrupts_enabled(true) {
                warn!(error = %e, "Interrupt re-enable failed");
            }
            if let Err(e) = port.set_engine_dma_enabled(true) {
                warn!(error = %e, "DMA re-enable failed");
            }
            run.engine_stopped = false;
        }

        if run.accelerators_stopped {
            match self.registry.begin_phase(Phase::Resume, run.scope) {
                Ok(_) => {
                    let result = self
                        .registry
                        .await_phase(Phase::Resume, self.config.resume_timeout)
                        .await;
                    debug!(?result, "Accelerators resumed after abort");
                    self.registry.end_phase();
                }
                Err(e) => warn!(error = %e, "Accelerator resume after abort failed"),
            }
            run.accelerators_stopped = false;
        }

        // Queue configuration is only lost once a reset was issued.
        if run.tier.is_some() {
            if let Some(snapshot) = &run.snapshot {
                if let Err(e) = snapshot.restore(port) {
                    warn!(error = %e, "Queue configuration restore after abort failed");
                }
            }
        }

        self.reopen_ports(&run.closed_ports);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapath::DatapathId;
    use crate::port::sim::{PortCall, SimulatedEngine};
    use crate::port::{ErrorEvents, QueueId};
    use crate::rendezvous::AcceleratorId;

    // =========================================================================
    // Test Helpers
    // =========================================================================

    struct Fixture {
        engine: Arc<SimulatedEngine>,
        registry: Arc<AcceleratorRegistry>,
        bank: DetectorBank,
        control: Arc<ControlSurface>,
        counters: Arc<RecoveryCounters>,
        lock: RecoveryLock,
        orchestrator: RecoveryOrchestrator,
    }

    fn fast_config() -> RecoveryConfig {
        RecoveryConfig::default()
            .with_rendezvous_timeouts(Duration::from_millis(50), Duration::from_millis(50))
            .with_reset_timeouts(Duration::from_millis(20), Duration::from_millis(20))
            .with_drain(Duration::from_millis(20), Duration::from_millis(1))
            .with_offload_idle(Duration::from_millis(20), Duration::from_millis(1))
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(SimulatedEngine::new());
        let registry = Arc::new(AcceleratorRegistry::new());
        let bank = DetectorBank::with_config(2, &[]);
        let control = Arc::new(ControlSurface::default());
        let counters = Arc::new(RecoveryCounters::new());
        let lock = RecoveryLock::new();
        let orchestrator = RecoveryOrchestrator::new(
            SharedPort::new(engine.clone()),
            Arc::clone(&registry),
            bank.clone(),
            Arc::clone(&control),
            Arc::clone(&counters),
            lock.clone(),
            fast_config(),
        );
        Fixture {
            engine,
            registry,
            bank,
            control,
            counters,
            lock,
            orchestrator,
        }
    }

    impl Fixture {
        async fn run(&self, request: RecoveryRequest) -> RecoveryReport {
            self.lock.submit(request);
            let guard = self.lock.try_acquire().unwrap();
            self.orchestrator.execute(guard).await
        }
    }

    // =========================================================================
    // Tests
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_clean_run_succeeds() {
        let f = fixture();
        let report = f.run(RecoveryRequest::hang(DatapathId::QdmaTx)).await;

        assert_eq!(report.outcome, RecoveryOutcome::Succeeded);
        assert_eq!(report.reset_tier, Some(ResetTier::Warm));
        assert_eq!(
            f.engine.resets_issued(),
            vec![(ResetTier::Warm, RecoveryScope::StopTraffic)]
        );
        assert!(!f.lock.is_held());
        assert_eq!(*f.orchestrator.state().borrow(), RecoveryState::Idle);

        let snap = f.counters.snapshot();
        assert_eq!(snap.runs_total, 1);
        assert_eq!(snap.warm_reset_completions, 1);
        assert_eq!(snap.outcomes_succeeded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ports_and_engine_restored() {
        let f = fixture();
        f.run(RecoveryRequest::manual(RecoveryScope::FullReset, false))
            .await;

        assert!(f.engine.dma_enabled());
        assert!(f.engine.interrupts_enabled());
        let gmac0 = f.engine.port_state(PortId(0)).unwrap();
        assert!(gmac0.admin_up);
        assert!(!gmac0.ingress_drop);
        // gmac1 was down before the run and stays down.
        assert!(!f.engine.port_state(PortId(1)).unwrap().admin_up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_warm_reset_escalates_to_cold() {
        let f = fixture();
        f.engine.set_reset_stuck(ResetTier::Warm);

        let report = f.run(RecoveryRequest::hang(DatapathId::QdmaTx)).await;

        assert_eq!(
            report.outcome,
            RecoveryOutcome::SucceededAfterEscalation {
                escalations: 1,
                config_mismatch: false
            }
        );
        assert_eq!(report.reset_tier, Some(ResetTier::Cold));
        assert_eq!(report.stats.warm_reset_attempts, 1);
        assert_eq!(report.stats.cold_reset_escalations, 1);
        let tiers: Vec<ResetTier> = f.engine.resets_issued().iter().map(|(t, _)| *t).collect();
        assert_eq!(tiers, vec![ResetTier::Warm, ResetTier::Cold]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_request_skips_warm() {
        let f = fixture();
        let report = f
            .run(RecoveryRequest::manual(RecoveryScope::FullReset, true))
            .await;
        assert_eq!(report.outcome, RecoveryOutcome::Succeeded);
        assert_eq!(report.stats.warm_reset_attempts, 0);
        assert_eq!(
            f.engine.resets_issued(),
            vec![(ResetTier::Cold, RecoveryScope::FullReset)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_reset_timeout_aborts_and_disables_auto() {
        let f = fixture();
        f.engine.set_reset_stuck(ResetTier::Warm);
        f.engine.set_reset_stuck(ResetTier::Cold);

        let report = f.run(RecoveryRequest::hang(DatapathId::GdmTx)).await;

        assert_eq!(
            report.outcome,
            RecoveryOutcome::Failed(FailureReason::ColdResetTimeout)
        );
        assert_eq!(f.control.auto_recovery(), AutoRecovery::Disabled);
        assert!(!f.lock.is_held());
        assert_eq!(f.counters.snapshot().outcomes_failed, 1);
        // Engine presumed dead: left stopped and closed.
        assert!(!f.engine.dma_enabled());
        assert!(!f.engine.port_state(PortId(0)).unwrap().admin_up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_failure_aborts_before_touching_hardware() {
        let f = fixture();
        f.engine.fail_op("read_queue_config");

        let report = f.run(RecoveryRequest::hang(DatapathId::QdmaRx)).await;

        assert!(matches!(
            report.outcome,
            RecoveryOutcome::Failed(FailureReason::SnapshotCapture(_))
        ));
        assert!(f.engine.calls().is_empty());
        assert_eq!(f.control.auto_recovery(), AutoRecovery::Enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_port_error_after_capture_aborts_without_disabling_auto() {
        let f = fixture();
        f.engine.fail_op("set_interrupts_enabled");

        let report = f.run(RecoveryRequest::hang(DatapathId::QdmaRx)).await;

        assert!(matches!(
            report.outcome,
            RecoveryOutcome::Failed(FailureReason::Port {
                state: RecoveryState::ExternalStop,
                ..
            })
        ));
        assert_eq!(f.control.auto_recovery(), AutoRecovery::Enabled);
        assert!(f.engine.resets_issued().is_empty());

        // The abort reopens what the run had closed.
        assert!(f.engine.dma_enabled());
        let gmac0 = f.engine.port_state(PortId(0)).unwrap();
        assert!(gmac0.admin_up);
        assert!(!gmac0.ingress_drop);
        let gmac1 = f.engine.port_state(PortId(1)).unwrap();
        assert!(!gmac1.admin_up);
        assert!(!gmac1.ingress_drop);
        assert!(f
            .engine
            .calls()
            .contains(&PortCall::SetAdminUp(PortId(0), true)));
        assert_eq!(*f.orchestrator.state().borrow(), RecoveryState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_during_stop_resumes_accelerators() {
        let f = fixture();
        f.registry.register(AcceleratorId(1));
        f.engine.fail_op("issue_reset");

        let report = f.run(RecoveryRequest::hang(DatapathId::QdmaRx)).await;

        assert!(matches!(
            report.outcome,
            RecoveryOutcome::Failed(FailureReason::Port {
                state: RecoveryState::Resetting,
                ..
            })
        ));
        assert!(f.engine.dma_enabled());
        assert!(f.engine.interrupts_enabled());
        assert!(f.engine.port_state(PortId(0)).unwrap().admin_up);
        assert!(f.registry.open_phase().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_restore_failure_reports_mismatch_and_reopens_ports() {
        let f = fixture();
        f.engine.fail_op("restore_link_config");

        let report = f.run(RecoveryRequest::hang(DatapathId::QdmaRx)).await;

        assert_eq!(
            report.outcome,
            RecoveryOutcome::SucceededAfterEscalation {
                escalations: 0,
                config_mismatch: true
            }
        );
        assert!(f.engine.dma_enabled());
        let gmac0 = f.engine.port_state(PortId(0)).unwrap();
        assert!(gmac0.admin_up);
        assert!(!gmac0.ingress_drop);
        assert!(!f.engine.port_state(PortId(1)).unwrap().ingress_drop);
        assert_eq!(f.control.auto_recovery(), AutoRecovery::Enabled);
        assert_eq!(f.counters.snapshot().config_mismatches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_accelerator_retried_once_then_skipped() {
        let f = fixture();
        f.registry.register(AcceleratorId(1));

        let report = f.run(RecoveryRequest::hang(DatapathId::WdmaTx)).await;

        assert_eq!(report.stats.stop_timeouts, 2);
        assert_eq!(report.stats.resume_timeouts, 2);
        assert_eq!(report.stats.rendezvous_escalations, 2);
        assert_eq!(
            report.outcome,
            RecoveryOutcome::SucceededAfterEscalation {
                escalations: 2,
                config_mismatch: false
            }
        );
        assert!(f.registry.open_phase().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_failure_widens_scope() {
        let f = fixture();
        f.registry.register(AcceleratorId(3));
        let mut notices = f.registry.subscribe();
        let registry = Arc::clone(&f.registry);
        tokio::spawn(async move {
            while let Ok(notice) = notices.recv().await {
                match notice.phase {
                    Phase::Stop => registry.report_failure(AcceleratorId(3), Phase::Stop, "busy"),
                    Phase::Resume => registry.acknowledge(AcceleratorId(3), Phase::Resume),
                };
            }
        });

        let report = f.run(RecoveryRequest::hang(DatapathId::TdmaRx)).await;

        assert_eq!(report.scope, RecoveryScope::FullReset);
        assert!(report.stats.scope_upgraded);
        assert_eq!(report.stats.stop_failures, 1);
        assert_eq!(report.stats.stop_timeouts, 0);
        assert_eq!(
            f.engine.resets_issued(),
            vec![(ResetTier::Warm, RecoveryScope::FullReset)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_mismatch_surfaces_in_outcome() {
        let f = fixture();
        f.engine.corrupt_restore_of(QueueId(7));

        let report = f.run(RecoveryRequest::hang(DatapathId::QdmaTx)).await;

        assert_eq!(
            report.outcome,
            RecoveryOutcome::SucceededAfterEscalation {
                escalations: 0,
                config_mismatch: true
            }
        );
        assert_eq!(f.counters.snapshot().config_mismatches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_before_reset_is_applied() {
        let f = fixture();
        f.lock.submit(RecoveryRequest::hang(DatapathId::QdmaTx));
        let guard = f.lock.try_acquire().unwrap();
        f.lock.submit(RecoveryRequest::hang(DatapathId::GdmRx));

        let report = f.orchestrator.execute(guard).await;

        assert_eq!(report.scope, RecoveryScope::FullReset);
        assert!(report.stats.scope_upgraded);
        assert_eq!(
            f.engine.resets_issued(),
            vec![(ResetTier::Warm, RecoveryScope::FullReset)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_census_counts_error_events_and_dumps() {
        let f = fixture();
        f.control.set_verbosity(DiagnosticsVerbosity::Dump);
        f.engine.set_error_events(ErrorEvents {
            tso_align: true,
            ..Default::default()
        });

        f.run(RecoveryRequest::manual(RecoveryScope::StopTraffic, false))
            .await;

        let snap = f.counters.snapshot();
        assert_eq!(snap.events_tso_align, 1);
        assert_eq!(snap.events_force, 1);
        assert!(f.engine.calls().contains(&PortCall::DumpDiagnostics));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_offload_and_stuck_queue_are_best_effort() {
        let f = fixture();
        f.engine.set_offload_busy(1, 0, true);
        f.engine.set_output_queue(64, true);

        let report = f.run(RecoveryRequest::hang(DatapathId::QdmaTx)).await;

        assert!(report.outcome.is_success());
        assert_eq!(report.stats.offload_idle_timeouts, 1);
        assert!(report.stats.drain_timed_out);
        let snap = f.counters.snapshot();
        assert_eq!(snap.drain_timeouts, 1);
        assert_eq!(snap.offload_idle_timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detectors_rearmed_after_success() {
        let f = fixture();
        f.engine.inject_hang(DatapathId::QdmaTx);
        f.bank.sample_all(f.engine.as_ref());
        f.bank.sample_all(f.engine.as_ref());
        assert_eq!(f.bank.stale_counts()[DatapathId::QdmaTx.index()].1, 1);

        f.run(RecoveryRequest::hang(DatapathId::QdmaTx)).await;

        assert!(f.bank.stale_counts().iter().all(|(_, c)| *c == 0));
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let f = fixture();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(f.orchestrator.run(shutdown.clone()));
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

//! Online accelerator set and the phase barrier.
//!
//! # Barrier rules
//!
//! - At most one phase is open at a time.
//! - Opening a phase snapshots the online set as the pending set.
//! - An acknowledgement counts once, only from a pending unit, and only for
//!   the open phase.
//! - A pending unit that goes offline is forgiven.
//! - A unit that comes online while a phase is open is not waited for.
//! - An explicit failure ends the wait at once.

use super::events::{
    AcceleratorEvent, AcceleratorId, Phase, PhaseNotice, PhaseResult, RendezvousError,
};
use crate::recovery::RecoveryScope;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Capacity of the phase notice broadcast channel.
pub const NOTICE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
struct OpenPhase {
    notice: PhaseNotice,
    pending: BTreeSet<AcceleratorId>,
    failure: Option<(AcceleratorId, String)>,
}

#[derive(Debug, Default)]
struct RegistryState {
    online: BTreeSet<AcceleratorId>,
    open: Option<OpenPhase>,
    epoch: u64,
}

/// Tracks online accelerators and runs the two-phase rendezvous.
#[derive(Debug)]
pub struct AcceleratorRegistry {
    state: Mutex<RegistryState>,
    changed: Notify,
    notices: broadcast::Sender<PhaseNotice>,
}

impl AcceleratorRegistry {
    pub fn new() -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(RegistryState::default()),
            changed: Notify::new(),
            notices,
        }
    }

    /// Receives a notice for every phase opened or re-broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<PhaseNotice> {
        self.notices.subscribe()
    }

    /// Marks a unit online. Returns false if it already was.
    pub fn register(&self, id: AcceleratorId) -> bool {
        let added = self.state.lock().online.insert(id);
        if added {
            info!(accelerator = %id, "Accelerator online");
        }
        added
    }

    /// Marks a unit offline, forgiving any acknowledgement it owes.
    pub fn unregister(&self, id: AcceleratorId) -> bool {
        let mut state = self.state.lock();
        let removed = state.online.remove(&id);
        let forgiven = state
            .open
            .as_mut()
            .is_some_and(|open| open.pending.remove(&id));
        drop(state);

        if removed {
            info!(accelerator = %id, "Accelerator offline");
        }
        if forgiven {
            debug!(accelerator = %id, "Pending acknowledgement forgiven");
            self.changed.notify_waiters();
        }
        removed
    }

    /// Opens a phase and broadcasts its notice to every online unit.
    pub fn begin_phase(
        &self,
        phase: Phase,
        scope: RecoveryScope,
    ) -> Result<PhaseNotice, RendezvousError> {
        let mut state = self.state.lock();
        if let Some(open) = &state.open {
            return Err(RendezvousError::PhaseAlreadyOpen {
                open: open.notice.phase,
                requested: phase,
            });
        }

        state.epoch += 1;
        let notice = PhaseNotice {
            phase,
            scope,
            epoch: state.epoch,
        };
        let pending = state.online.clone();
        let expected = pending.len();
        state.open = Some(OpenPhase {
            notice,
            pending,
            failure: None,
        });
        drop(state);

        info!(%phase, %scope, epoch = notice.epoch, expected, "Rendezvous phase opened");
        // No subscribers is fine: nobody to wait for either.
        let _ = self.notices.send(notice);
        Ok(notice)
    }

    /// Sends the open phase's notice again; acknowledgements already received
    /// still count.
    pub fn rebroadcast(&self, phase: Phase) -> Result<PhaseNotice, RendezvousError> {
        let state = self.state.lock();
        let notice = match &state.open {
            Some(open) if open.notice.phase == phase => open.notice,
            _ => return Err(RendezvousError::PhaseNotOpen(phase)),
        };
        let pending = state.open.as_ref().map_or(0, |open| open.pending.len());
        drop(state);

        info!(%phase, epoch = notice.epoch, pending, "Rendezvous phase re-broadcast");
        let _ = self.notices.send(notice);
        Ok(notice)
    }

    /// Records an acknowledgement. Returns true if it counted.
    pub fn acknowledge(&self, id: AcceleratorId, phase: Phase) -> bool {
        let mut state = self.state.lock();
        let (counted, remaining) = match state.open.as_mut() {
            Some(open) if open.notice.phase == phase => {
                let counted = open.pending.remove(&id);
                (counted, open.pending.len())
            }
            _ => (false, 0),
        };
        drop(state);

        if counted {
            debug!(accelerator = %id, %phase, remaining, "Acknowledgement received");
            if remaining == 0 {
                self.changed.notify_waiters();
            }
        } else {
            debug!(accelerator = %id, %phase, "Acknowledgement ignored");
        }
        counted
    }

    /// Records an explicit failure for the open phase. Returns true if it
    /// was accepted.
    pub fn report_failure(&self, id: AcceleratorId, phase: Phase, reason: &str) -> bool {
        let mut state = self.state.lock();
        let online = state.online.contains(&id);
        let accepted = match state.open.as_mut() {
            Some(open) if open.notice.phase == phase && online => {
                if open.failure.is_none() {
                    open.failure = Some((id, reason.to_string()));
                }
                true
            }
            _ => false,
        };
        drop(state);

        if accepted {
            warn!(accelerator = %id, %phase, reason, "Accelerator reported failure");
            self.changed.notify_waiters();
        }
        accepted
    }

    /// Waits until the phase completes, fails, or `timeout` passes.
    ///
    /// Returns `Completed` at once if `phase` is not the open phase.
    pub async fn await_phase(&self, phase: Phase, timeout: Duration) -> PhaseResult {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.phase_result(phase) {
                return result;
            }

            if tokio::time::timeout_at(deadline, &mut notified).await.is_err() {
                let pending = self.pending_acks().unwrap_or(0);
                return self.phase_result(phase).unwrap_or(PhaseResult::TimedOut { pending });
            }
        }
    }

    fn phase_result(&self, phase: Phase) -> Option<PhaseResult> {
        let state = self.state.lock();
        match &state.open {
            Some(open) if open.notice.phase == phase => {
                if let Some((id, reason)) = &open.failure {
                    Some(PhaseResult::Failed {
                        id: *id,
                        reason: reason.clone(),
                    })
                } else if open.pending.is_empty() {
                    Some(PhaseResult::Completed)
                } else {
                    None
                }
            }
            _ => Some(PhaseResult::Completed),
        }
    }

    /// Closes the open phase, if any.
    pub fn end_phase(&self) {
        let closed = self.state.lock().open.take();
        if let Some(open) = closed {
            debug!(
                phase = %open.notice.phase,
                epoch = open.notice.epoch,
                outstanding = open.pending.len(),
                "Rendezvous phase closed"
            );
        }
    }

    /// Applies an event from the accelerator transport.
    pub fn apply(&self, event: AcceleratorEvent) {
        match event {
            AcceleratorEvent::Online(id) => {
                self.register(id);
            }
            AcceleratorEvent::Offline(id) => {
                self.unregister(id);
            }
            AcceleratorEvent::Ack { id, phase } => {
                self.acknowledge(id, phase);
            }
            AcceleratorEvent::Failure { id, phase, reason } => {
                self.report_failure(id, phase, &reason);
            }
        }
    }

    /// Units currently online.
    pub fn online(&self) -> Vec<AcceleratorId> {
        self.state.lock().online.iter().copied().collect()
    }

    /// The phase currently open.
    pub fn open_phase(&self) -> Option<Phase> {
        self.state.lock().open.as_ref().map(|open| open.notice.phase)
    }

    /// Acknowledgements still owed for the open phase.
    pub fn pending_acks(&self) -> Option<usize> {
        self.state.lock().open.as_ref().map(|open| open.pending.len())
    }
}

impl Default for AcceleratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Scripted accelerator units for simulation and tests.

use super::events::{AcceleratorId, Phase, PhaseNotice};
use super::link::AcceleratorLink;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a simulated unit answers phase notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderBehavior {
    /// Acknowledge every phase after `delay`.
    Ack { delay: Duration },
    /// Never answer.
    Silent,
    /// Report failure for the given phase, acknowledge the other.
    FailOn(Phase),
    /// Go offline instead of answering the given phase.
    LeaveOn(Phase),
}

/// A simulated accelerator that registers itself and answers notices.
#[derive(Debug, Clone)]
pub struct SimulatedAccelerator {
    pub id: AcceleratorId,
    pub behavior: ResponderBehavior,
}

impl SimulatedAccelerator {
    pub fn new(id: u32, behavior: ResponderBehavior) -> Self {
        Self {
            id: AcceleratorId(id),
            behavior,
        }
    }

    /// Registers the unit and answers notices until cancelled.
    ///
    /// `notices` must be subscribed before the first phase this unit should
    /// see is opened.
    pub fn spawn(
        self,
        link: AcceleratorLink,
        mut notices: broadcast::Receiver<PhaseNotice>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            if link.on_online(self.id).is_err() {
                return;
            }

            loop {
                let notice = tokio::select! {
                    received = notices.recv() => match received {
                        Ok(notice) => notice,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.cancelled() => break,
                };

                if !self.answer(&link, notice).await {
                    break;
                }
            }
        })
    }

    /// Answers one notice. Returns false once the unit has gone offline.
    async fn answer(&self, link: &AcceleratorLink, notice: PhaseNotice) -> bool {
        debug!(accelerator = %self.id, phase = %notice.phase, "Simulated accelerator notified");
        let sent = match &self.behavior {
            ResponderBehavior::Ack { delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                link.on_ack(self.id, notice.phase)
            }
            ResponderBehavior::Silent => Ok(()),
            ResponderBehavior::FailOn(phase) if *phase == notice.phase => {
                link.on_failure(self.id, notice.phase, "simulated failure")
            }
            ResponderBehavior::FailOn(_) => link.on_ack(self.id, notice.phase),
            ResponderBehavior::LeaveOn(phase) if *phase == notice.phase => {
                let _ = link.on_offline(self.id);
                return false;
            }
            ResponderBehavior::LeaveOn(_) => link.on_ack(self.id, notice.phase),
        };
        sent.is_ok()
    }
}

//! Typed event delivery from the accelerator transport to the registry.

use super::events::{AcceleratorEvent, AcceleratorId, Phase, RendezvousError};
use super::registry::AcceleratorRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle given to the accelerator-facing transport.
///
/// Calls never block; events are applied in order by the registry's pump.
#[derive(Debug, Clone)]
pub struct AcceleratorLink {
    tx: mpsc::UnboundedSender<AcceleratorEvent>,
}

impl AcceleratorLink {
    /// Creates a link and the receiver to hand to [`run_event_pump`].
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AcceleratorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn on_online(&self, id: AcceleratorId) -> Result<(), RendezvousError> {
        self.send(AcceleratorEvent::Online(id))
    }

    pub fn on_offline(&self, id: AcceleratorId) -> Result<(), RendezvousError> {
        self.send(AcceleratorEvent::Offline(id))
    }

    pub fn on_ack(&self, id: AcceleratorId, phase: Phase) -> Result<(), RendezvousError> {
        self.send(AcceleratorEvent::Ack { id, phase })
    }

    pub fn on_failure(
        &self,
        id: AcceleratorId,
        phase: Phase,
        reason: impl Into<String>,
    ) -> Result<(), RendezvousError> {
        self.send(AcceleratorEvent::Failure {
            id,
            phase,
            reason: reason.into(),
        })
    }

    fn send(&self, event: AcceleratorEvent) -> Result<(), RendezvousError> {
        self.tx.send(event).map_err(|_| RendezvousError::LinkClosed)
    }
}

/// Applies link events to the registry until cancelled or every link is
/// dropped.
pub async fn run_event_pump(
    registry: Arc<AcceleratorRegistry>,
    mut events: mpsc::UnboundedReceiver<AcceleratorEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => registry.apply(event),
                None => {
                    debug!("Accelerator link closed");
                    break;
                }
            },
            _ = shutdown.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::RecoveryScope;
    use std::time::Duration;

    #[tokio::test]
    async fn test_events_reach_registry() {
        let registry = Arc::new(AcceleratorRegistry::new());
        let (link, rx) = AcceleratorLink::channel();
        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(run_event_pump(
            Arc::clone(&registry),
            rx,
            shutdown.clone(),
        ));

        link.on_online(AcceleratorId(4)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.online(), vec![AcceleratorId(4)]);

        registry.begin_phase(Phase::Stop, RecoveryScope::StopTraffic).unwrap();
        link.on_ack(AcceleratorId(4), Phase::Stop).unwrap();
        let result = registry
            .await_phase(Phase::Stop, Duration::from_secs(1))
            .await;
        assert_eq!(result, super::super::PhaseResult::Completed);

        shutdown.cancel();
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_after_pump_gone_fails() {
        let (link, rx) = AcceleratorLink::channel();
        drop(rx);
        assert_eq!(
            link.on_online(AcceleratorId(1)),
            Err(RendezvousError::LinkClosed)
        );
    }
}

//! The recovery gate: at most one run in flight, at most one pending request.
//!
//! Submitters never block. A request either becomes the pending request,
//! is merged into it, escalates the run in flight, or is dropped. The
//! orchestrator worker takes the pending request with [`RecoveryLock::next`],
//! which marks the lock held until the returned guard is dropped.

use super::request::{RecoveryRequest, RecoveryScope};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// What happened to a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Became the pending request.
    Queued,
    /// Raised the scope or reset tier of the pending request.
    Merged,
    /// Raised the scope or reset tier of the run in flight.
    Escalated,
    /// Added nothing to the pending request or the run in flight.
    Dropped,
}

/// Scope and tier demanded of the run in flight by later submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upgrade {
    pub scope: RecoveryScope,
    pub cold_reset: bool,
}

#[derive(Debug)]
struct HeldRun {
    scope: RecoveryScope,
    cold_reset: bool,
    upgrade: Option<Upgrade>,
}

#[derive(Debug, Default)]
struct Gate {
    held: Option<HeldRun>,
    pending: Option<RecoveryRequest>,
}

#[derive(Debug, Default)]
struct Shared {
    gate: Mutex<Gate>,
    notify: Notify,
}

/// Gate serialising recovery runs.
#[derive(Debug, Clone, Default)]
pub struct RecoveryLock {
    shared: Arc<Shared>,
}

impl RecoveryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a request to the gate without blocking.
    pub fn submit(&self, request: RecoveryRequest) -> Submission {
        self.submit_if(request, || true)
            .unwrap_or(Submission::Dropped)
    }

    /// Offers a request that needs `permit` to go ahead.
    ///
    /// `permit` is consulted under the gate, and only when the request would
    /// add something: a duplicate comes back `Dropped` without touching it.
    /// Returns `None` when `permit` refuses.
    pub fn submit_if(
        &self,
        request: RecoveryRequest,
        permit: impl FnOnce() -> bool,
    ) -> Option<Submission> {
        let mut gate = self.shared.gate.lock();

        if let Some(held) = gate.held.as_mut() {
            let scope = held.scope.max(request.scope);
            let cold_reset = held.cold_reset || request.cold_reset;
            if scope == held.scope && cold_reset == held.cold_reset {
                return Some(Submission::Dropped);
            }
            if !permit() {
                return None;
            }
            held.scope = scope;
            held.cold_reset = cold_reset;
            held.upgrade = Some(Upgrade { scope, cold_reset });
            return Some(Submission::Escalated);
        }

        match gate.pending.as_mut() {
            None => {
                if !permit() {
                    return None;
                }
                gate.pending = Some(request);
                drop(gate);
                self.shared.notify.notify_one();
                Some(Submission::Queued)
            }
            Some(pending) => {
                let scope = pending.scope.max(request.scope);
                let cold_reset = pending.cold_reset || request.cold_reset;
                if scope == pending.scope && cold_reset == pending.cold_reset {
                    Some(Submission::Dropped)
                } else if !permit() {
                    None
                } else {
                    pending.scope = scope;
                    pending.cold_reset = cold_reset;
                    Some(Submission::Merged)
                }
            }
        }
    }

    /// Waits for a pending request and takes the lock for it.
    ///
    /// Returns `None` once `shutdown` is cancelled.
    pub async fn next(&self, shutdown: &CancellationToken) -> Option<RecoveryLockGuard> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(guard) = self.try_acquire() {
                return Some(guard);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = shutdown.cancelled() => return None,
            }
        }
    }

    /// Takes the pending request if the lock is free.
    pub fn try_acquire(&self) -> Option<RecoveryLockGuard> {
        let mut gate = self.shared.gate.lock();
        if gate.held.is_some() {
            return None;
        }
        let request = gate.pending.take()?;
        gate.held = Some(HeldRun {
            scope: request.scope,
            cold_reset: request.cold_reset,
            upgrade: None,
        });
        Some(RecoveryLockGuard {
            shared: Arc::clone(&self.shared),
            request,
        })
    }

    /// True while a run holds the lock.
    pub fn is_held(&self) -> bool {
        self.shared.gate.lock().held.is_some()
    }

    /// The request waiting for the lock, if any.
    pub fn pending(&self) -> Option<RecoveryRequest> {
        self.shared.gate.lock().pending
    }
}

/// Held for the whole of one recovery run. Dropping it frees the lock.
#[derive(Debug)]
pub struct RecoveryLockGuard {
    shared: Arc<Shared>,
    request: RecoveryRequest,
}

impl RecoveryLockGuard {
    /// The request this run serves, as originally submitted.
    pub fn request(&self) -> RecoveryRequest {
        self.request
    }

    /// Takes any escalation submitted since the last checkpoint.
    pub fn take_upgrade(&self) -> Option<Upgrade> {
        self.shared
            .gate
            .lock()
            .held
            .as_mut()
            .and_then(|held| held.upgrade.take())
    }
}

impl Drop for RecoveryLockGuard {
    fn drop(&mut self) {
        self.shared.gate.lock().held = None;
        // A request may have been queued behind the run; wake the worker.
        self.shared.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapath::DatapathId;
    use crate::recovery::RecoveryCause;
    use std::time::Duration;

    fn stop_traffic() -> RecoveryRequest {
        RecoveryRequest::hang(DatapathId::QdmaTx)
    }

    fn full_reset() -> RecoveryRequest {
        RecoveryRequest::hang(DatapathId::GdmRx)
    }

    #[test]
    fn test_first_submission_is_queued() {
        let lock = RecoveryLock::new();
        assert_eq!(lock.submit(stop_traffic()), Submission::Queued);
        assert_eq!(lock.pending(), Some(stop_traffic()));
        assert!(!lock.is_held());
    }

    #[test]
    fn test_duplicate_pending_is_dropped() {
        let lock = RecoveryLock::new();
        lock.submit(stop_traffic());
        assert_eq!(lock.submit(stop_traffic()), Submission::Dropped);
    }

    #[test]
    fn test_permit_only_consulted_when_request_adds_something() {
        let lock = RecoveryLock::new();
        assert_eq!(lock.submit_if(stop_traffic(), || false), None);
        assert_eq!(lock.pending(), None);

        lock.submit(stop_traffic());
        let mut asked = false;
        let duplicate = lock.submit_if(stop_traffic(), || {
            asked = true;
            true
        });
        assert_eq!(duplicate, Some(Submission::Dropped));
        assert!(!asked);

        assert_eq!(lock.submit_if(full_reset(), || false), None);
        assert_eq!(lock.pending().unwrap().scope, RecoveryScope::StopTraffic);
        assert_eq!(
            lock.submit_if(full_reset(), || true),
            Some(Submission::Merged)
        );
    }

    #[test]
    fn test_wider_pending_request_is_merged() {
        let lock = RecoveryLock::new();
        lock.submit(stop_traffic());
        assert_eq!(lock.submit(full_reset()), Submission::Merged);

        let pending = lock.pending().unwrap();
        assert_eq!(pending.scope, RecoveryScope::FullReset);
        // The first cause is kept.
        assert_eq!(pending.cause, RecoveryCause::HangDetected(DatapathId::QdmaTx));
    }

    #[test]
    fn test_held_lock_escalates_or_drops() {
        let lock = RecoveryLock::new();
        lock.submit(stop_traffic());
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_held());

        assert_eq!(lock.submit(stop_traffic()), Submission::Dropped);
        assert_eq!(lock.pending(), None);

        assert_eq!(lock.submit(full_reset()), Submission::Escalated);
        assert_eq!(
            guard.take_upgrade(),
            Some(Upgrade {
                scope: RecoveryScope::FullReset,
                cold_reset: false
            })
        );
        assert_eq!(guard.take_upgrade(), None);

        assert_eq!(lock.submit(full_reset()), Submission::Dropped);
        assert_eq!(
            lock.submit(RecoveryRequest::manual(RecoveryScope::StopTraffic, true)),
            Submission::Escalated
        );
    }

    #[test]
    fn test_drop_guard_releases_lock() {
        let lock = RecoveryLock::new();
        lock.submit(stop_traffic());
        let guard = lock.try_acquire().unwrap();
        assert!(lock.try_acquire().is_none());
        drop(guard);
        assert!(!lock.is_held());
        assert_eq!(lock.submit(stop_traffic()), Submission::Queued);
    }

    #[tokio::test]
    async fn test_next_waits_for_submission() {
        let lock = RecoveryLock::new();
        let shutdown = CancellationToken::new();

        let waiter = {
            let lock = lock.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { lock.next(&shutdown).await.map(|g| g.request()) })
        };

        tokio::task::yield_now().await;
        lock.submit(full_reset());

        let request = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request, Some(full_reset()));
    }

    #[tokio::test]
    async fn test_next_returns_none_on_shutdown() {
        let lock = RecoveryLock::new();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(lock.next(&shutdown).await.is_none());
    }

    #[test]
    fn test_concurrent_submitters_hold_at_most_one_run() {
        let lock = RecoveryLock::new();
        let acquired = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for i in 0..8 {
                let lock = lock.clone();
                let acquired = Arc::clone(&acquired);
                scope.spawn(move || {
                    for _ in 0..100 {
                        let request = if i % 2 == 0 { stop_traffic() } else { full_reset() };
                        lock.submit(request);
                        if let Some(guard) = lock.try_acquire() {
                            let running =
                                acquired.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                            assert_eq!(running, 1);
                            acquired.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                            drop(guard);
                        }
                    }
                });
            }
        });
    }
}

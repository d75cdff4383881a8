//! Single-flight refresh.
//!
//! ```text
//!   caller A ──refresh()──┐
//!   caller B ──refresh()──┼──→ one spawned task ──→ refresh_fn()
//!   caller C ──refresh()──┘          │
//!                                    ▼
//!                         Shared outcome, cloned to A, B, C
//! ```
//!
//! The attempt runs as its own Tokio task, so a caller that stops waiting
//! (timeout, dropped future) doesn't cancel the refresh for everyone else.
//! The in-flight marker is cleared by a drop guard inside that task, which
//! also runs when the refresh panics.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::{debug, warn};

use crate::RefreshError;

type SharedOutcome = Shared<BoxFuture<'static, Result<(), RefreshError>>>;

struct InFlight {
    generation: u64,
    outcome: SharedOutcome,
}

#[derive(Default)]
struct Slot {
    next_generation: u64,
    in_flight: Option<InFlight>,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight marker when the refresh task finishes, however it
/// finishes.
struct ClearOnDrop {
    slot: Arc<Mutex<Slot>>,
    generation: u64,
}

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == self.generation)
        {
            slot.in_flight = None;
        }
    }
}

/// Makes sure at most one token refresh is in flight.
///
/// Cheap to clone; clones share the same in-flight state.
///
/// Must be used from inside a Tokio runtime.
#[derive(Clone, Default)]
pub struct RefreshCoordinator {
    slot: Arc<Mutex<Slot>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `refresh_fn` unless a refresh is already in flight, in which
    /// case it joins that one. Returns `true` on success.
    ///
    /// Failures (including panics) are logged and reported as `false`.
    pub async fn refresh<F, Fut>(&self, refresh_fn: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), RefreshError>> + Send + 'static,
    {
        match self.refresh_detailed(refresh_fn).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                false
            }
        }
    }

    /// Like [`refresh`](Self::refresh), but hands back the error.
    ///
    /// `refresh_fn` is only called when this caller starts a new attempt.
    /// It's called while the in-flight state is locked, so it must not
    /// call back into this coordinator; do the work in the returned future.
    ///
    /// # Errors
    /// The error from the attempt this caller started or joined;
    /// [`RefreshError::Aborted`] if that attempt panicked.
    pub async fn refresh_detailed<F, Fut>(&self, refresh_fn: F) -> Result<(), RefreshError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), RefreshError>> + Send + 'static,
    {
        let outcome = {
            let mut slot = lock(&self.slot);
            match &slot.in_flight {
                Some(in_flight) => {
                    debug!(generation = in_flight.generation, "joining in-flight refresh");
                    in_flight.outcome.clone()
                }
                None => {
                    let generation = slot.next_generation;
                    slot.next_generation += 1;

                    let shared_slot = Arc::clone(&self.slot);
                    let attempt = refresh_fn();
                    let task = tokio::spawn(async move {
                        let _guard = ClearOnDrop {
                            slot: shared_slot,
                            generation,
                        };
                        attempt.await
                    });
                    let outcome = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) => Err(RefreshError::Aborted(e.to_string())),
                        }
                    }
                    .boxed()
                    .shared();

                    debug!(generation, "refresh started");
                    slot.in_flight = Some(InFlight {
                        generation,
                        outcome: outcome.clone(),
                    });
                    outcome
                }
            }
        };
        outcome.await
    }

    /// Whether an attempt is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        lock(&self.slot).in_flight.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;

    fn counting(
        calls: &Arc<AtomicUsize>,
        gate: &Arc<Notify>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<(), RefreshError>> + use<> {
        let calls = Arc::clone(calls);
        let gate = Arc::clone(gate);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                gate.notified().await;
                Ok(())
            }
            .boxed()
        }
    }

    // =====================================================================
    // Single flight
    // =====================================================================

    #[tokio::test]
    async fn test_refresh_concurrent_callers_share_one_attempt() {
        let coordinator = RefreshCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let (a, b, c, ()) = tokio::join!(
            coordinator.refresh(counting(&calls, &gate)),
            coordinator.refresh(counting(&calls, &gate)),
            coordinator.refresh(counting(&calls, &gate)),
            async {
                tokio::task::yield_now().await;
                gate.notify_one();
            },
        );

        assert!(a && b && c);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_refresh_sequential_calls_each_run() {
        let coordinator = RefreshCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        for _ in 0..3 {
            gate.notify_one();
            assert!(coordinator.refresh(counting(&calls, &gate)).await);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_is_refreshing_while_in_flight() {
        let coordinator = RefreshCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            let refresh_fn = counting(&calls, &gate);
            async move { coordinator.refresh(refresh_fn).await }
        });
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        gate.notify_one();
        assert!(pending.await.unwrap());
        assert!(!coordinator.is_refreshing());
    }

    // =====================================================================
    // Failures
    // =====================================================================

    #[tokio::test]
    async fn test_refresh_failure_returns_false_and_resets() {
        let coordinator = RefreshCoordinator::new();

        let ok = coordinator
            .refresh(|| async { Err::<(), _>(RefreshError::Transport("connection reset".into())) })
            .await;

        assert!(!ok);
        assert!(!coordinator.is_refreshing());
        assert!(coordinator.refresh(|| async { Ok(()) }).await);
    }

    #[tokio::test]
    async fn test_refresh_detailed_shares_error_with_joiners() {
        let coordinator = RefreshCoordinator::new();
        let gate = Arc::new(Notify::new());
        let rejected = RefreshError::Rejected {
            operation: "token refresh",
            status: 401,
            detail: "expired".into(),
        };

        let failing = {
            let gate = Arc::clone(&gate);
            let rejected = rejected.clone();
            move || async move {
                gate.notified().await;
                Err::<(), _>(rejected)
            }
        };
        let (first, second, ()) = tokio::join!(
            coordinator.refresh_detailed(failing),
            coordinator.refresh_detailed(|| async { Ok(()) }),
            async {
                tokio::task::yield_now().await;
                gate.notify_one();
            },
        );

        assert_eq!(first, Err(rejected.clone()));
        assert_eq!(second, Err(rejected));
    }

    #[tokio::test]
    async fn test_refresh_panic_reports_aborted_and_resets() {
        let coordinator = RefreshCoordinator::new();

        async fn explode() -> Result<(), RefreshError> {
            panic!("auth client blew up")
        }

        let result = coordinator.refresh_detailed(explode).await;

        assert!(matches!(result, Err(RefreshError::Aborted(_))));
        assert!(!coordinator.is_refreshing());
        assert!(coordinator.refresh(|| async { Ok(()) }).await);
    }

    // =====================================================================
    // Caller cancellation
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_refresh_completes_when_caller_gives_up() {
        let coordinator = RefreshCoordinator::new();
        let finished = Arc::new(AtomicBool::new(false));

        let slow = {
            let finished = Arc::clone(&finished);
            move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                finished.store(true, Ordering::SeqCst);
                Ok(())
            }
        };
        let gave_up = tokio::time::timeout(Duration::from_millis(1), coordinator.refresh(slow)).await;
        assert!(gave_up.is_err());
        assert!(coordinator.is_refreshing());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(finished.load(Ordering::SeqCst));
        assert!(!coordinator.is_refreshing());
    }
}

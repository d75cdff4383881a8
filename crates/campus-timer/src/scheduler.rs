//! Proactive refresh scheduling.
//!
//! ```text
//!   schedule(token)
//!        │  exp = 12:10, lead = 5 min
//!        ▼
//!   cancel old timer ──→ arm new timer for 12:05 ──→ TokenRefreshNeeded
//! ```
//!
//! There is at most one live timer. Every `schedule`/`cancel` bumps a
//! generation; a timer only fires if its generation is still current when
//! it wakes, so a superseded timer stays silent even if it raced the abort.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use campus_token::{Clock, SessionEvent, expiry_time_millis};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long before `exp` the refresh is requested.
pub const DEFAULT_LEAD_TIME: Duration = Duration::from_secs(5 * 60);

/// What [`ExpiryScheduler::schedule`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A timer will fire after this delay.
    Armed(Duration),
    /// The refresh point has already passed. No timer was armed.
    Due,
    /// The token carries no usable `exp`. No timer was armed.
    NoExpiry,
    /// Called outside a Tokio runtime. No timer was armed.
    NoRuntime,
}

#[derive(Default)]
struct Pending {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl Pending {
    /// Aborts the live timer (if any) and invalidates it.
    fn supersede(&mut self) -> u64 {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
        self.generation
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Arms a single timer that requests a token refresh before `exp`.
pub struct ExpiryScheduler {
    clock: Arc<dyn Clock>,
    lead_time: Duration,
    events: broadcast::Sender<SessionEvent>,
    pending: Arc<Mutex<Pending>>,
}

impl ExpiryScheduler {
    /// Creates a scheduler that announces on `events`.
    pub fn new(
        clock: Arc<dyn Clock>,
        lead_time: Duration,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            clock,
            lead_time,
            events,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    pub fn lead_time(&self) -> Duration {
        self.lead_time
    }

    /// Cancels any pending timer, then arms one for `exp − lead_time`.
    pub fn schedule(&self, access_token: &str) -> ScheduleOutcome {
        let mut pending = lock(&self.pending);
        let generation = pending.supersede();

        let Some(expiry_ms) = expiry_time_millis(access_token) else {
            debug!("access token has no expiry; refresh not scheduled");
            return ScheduleOutcome::NoExpiry;
        };
        let lead_ms = i64::try_from(self.lead_time.as_millis()).unwrap_or(i64::MAX);
        let fire_at_ms = expiry_ms.saturating_sub(lead_ms);
        let delay_ms = fire_at_ms.saturating_sub(self.clock.now().timestamp_millis());
        if delay_ms <= 0 {
            debug!(expiry_ms, "token already inside refresh window");
            return ScheduleOutcome::Due;
        }
        let delay = Duration::from_millis(delay_ms.unsigned_abs());

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "no Tokio runtime; refresh not scheduled");
                return ScheduleOutcome::NoRuntime;
            }
        };

        let events = self.events.clone();
        let shared = Arc::clone(&self.pending);
        pending.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let mut pending = lock(&shared);
            if pending.generation != generation {
                return;
            }
            pending.timer = None;
            drop(pending);

            debug!(generation, "refresh timer fired");
            // No receivers just means nobody is listening yet.
            let _ = events.send(SessionEvent::TokenRefreshNeeded);
        }));

        debug!(generation, delay_secs = delay.as_secs(), "refresh timer armed");
        ScheduleOutcome::Armed(delay)
    }

    /// Cancels the pending timer, if any. Idempotent.
    pub fn cancel(&self) {
        let mut pending = lock(&self.pending);
        if pending.timer.is_some() {
            debug!(generation = pending.generation, "refresh timer cancelled");
        }
        pending.supersede();
    }

    /// Whether a timer is armed and hasn't fired yet.
    pub fn is_armed(&self) -> bool {
        lock(&self.pending).timer.is_some()
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        lock(&self.pending).supersede();
    }
}

impl std::fmt::Debug for ExpiryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryScheduler")
            .field("lead_time", &self.lead_time)
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}

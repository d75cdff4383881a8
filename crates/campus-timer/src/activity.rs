//! Debounced activity tracking.
//!
//! The tracker is an actor: one Tokio task owns the debounce deadline and
//! the last-seen visibility, and the outside world talks to it through an
//! [`ActivityHandle`].
//!
//! ```text
//!   move move key ... (quiet 30 s) ──→ stamp
//!   hidden ──→ visible            ──→ stamp (right away)
//! ```

use std::sync::Arc;
use std::time::Duration;

use campus_token::Clock;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Raw user interactions that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    PointerMove,
    KeyPress,
    Scroll,
    Touch,
    Click,
}

/// Whether the context is in front of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Receives activity stamps.
pub trait ActivitySink: Send + Sync + 'static {
    /// The user was active at `at`.
    fn record_activity(&self, at: DateTime<Utc>);
}

#[derive(Debug, Clone)]
pub struct ActivityConfig {
    /// Quiet period after the last interaction before a stamp is written.
    pub debounce: Duration,
}

impl ActivityConfig {
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(30);
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            debounce: Self::DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Debug)]
enum ActivityCommand {
    Interaction(Interaction),
    Visibility(Visibility),
    Shutdown,
}

/// Handle to a running activity tracker. Cheap to clone.
///
/// All methods return `false` once the tracker has stopped.
#[derive(Debug, Clone)]
pub struct ActivityHandle {
    sender: mpsc::UnboundedSender<ActivityCommand>,
}

impl ActivityHandle {
    /// Reports a user interaction; re-arms the debounce.
    pub fn interaction(&self, kind: Interaction) -> bool {
        self.sender.send(ActivityCommand::Interaction(kind)).is_ok()
    }

    /// Reports a visibility change.
    pub fn visibility_changed(&self, visibility: Visibility) -> bool {
        self.sender.send(ActivityCommand::Visibility(visibility)).is_ok()
    }

    /// Stops the tracker. A pending debounced stamp is dropped.
    pub fn shutdown(&self) -> bool {
        self.sender.send(ActivityCommand::Shutdown).is_ok()
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// The tracker actor. Created with [`ActivityTracker::spawn`].
pub struct ActivityTracker {
    config: ActivityConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ActivitySink>,
    visibility: Visibility,
    deadline: Option<Instant>,
    receiver: mpsc::UnboundedReceiver<ActivityCommand>,
}

impl ActivityTracker {
    /// Spawns a tracker task and returns a handle to feed it.
    ///
    /// The context starts out visible.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(
        config: ActivityConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn ActivitySink>,
    ) -> ActivityHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        let tracker = Self {
            config,
            clock,
            sink,
            visibility: Visibility::default(),
            deadline: None,
            receiver,
        };
        tokio::spawn(tracker.run());
        ActivityHandle { sender }
    }

    async fn run(mut self) {
        debug!(debounce_ms = self.config.debounce.as_millis() as u64, "activity tracker started");

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(ActivityCommand::Interaction(kind)) => {
                        trace!(?kind, "interaction");
                        self.deadline = Some(Instant::now() + self.config.debounce);
                    }
                    Some(ActivityCommand::Visibility(visibility)) => {
                        let previous = std::mem::replace(&mut self.visibility, visibility);
                        if previous == Visibility::Hidden && visibility == Visibility::Visible {
                            self.stamp("became visible");
                        }
                    }
                    Some(ActivityCommand::Shutdown) | None => break,
                },
                () = wait_until(self.deadline) => {
                    self.deadline = None;
                    self.stamp("debounce elapsed");
                }
            }
        }

        debug!("activity tracker stopped");
    }

    fn stamp(&self, cause: &'static str) {
        let at = self.clock.now();
        trace!(cause, %at, "activity stamped");
        self.sink.record_activity(at);
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! Background tasks of a running session.

use campus_refresh::AuthApi;
use campus_timer::{ActivityConfig, ActivityHandle, ActivityTracker};
use campus_token::SessionEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{CrossTabSync, ExpiryWatch, SessionManager};

/// The tasks started by [`SessionManager::start`].
///
/// Dropping it stops everything, same as [`shutdown`](Self::shutdown).
#[derive(Debug)]
pub struct SessionRuntime {
    activity: ActivityHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionRuntime {
    /// Where the host reports interactions and visibility changes.
    pub fn activity(&self) -> &ActivityHandle {
        &self.activity
    }

    /// Stops every background task. The work happens in `Drop` when `self`
    /// goes out of scope at the end of this call.
    pub fn shutdown(self) {
        info!(tasks = self.tasks.len(), "session runtime shutting down");
    }
}

impl Drop for SessionRuntime {
    fn drop(&mut self) {
        self.activity.shutdown();
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl<A: AuthApi> SessionManager<A> {
    /// Starts the background machinery:
    ///
    /// - a reactor that refreshes on [`SessionEvent::TokenRefreshNeeded`]
    /// - the periodic [`ExpiryWatch`]
    /// - an activity tracker stamping into this manager
    /// - [`CrossTabSync`], when the durable tier is shared
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) -> SessionRuntime {
        let mut tasks = Vec::with_capacity(3);

        let events = self.subscribe();
        tasks.push(tokio::spawn(react(self.clone(), events)));
        tasks.push(ExpiryWatch::spawn(self.clone(), self.policy().watch_interval));
        if let Some(context) = self.shared_context() {
            tasks.push(CrossTabSync::spawn(context.subscribe(), self.clone()));
        }

        let activity = ActivityTracker::spawn(
            ActivityConfig {
                debounce: self.policy().activity_debounce,
            },
            self.clock(),
            std::sync::Arc::new(self.clone()),
        );

        info!(tasks = tasks.len() + 1, "session runtime started");
        SessionRuntime { activity, tasks }
    }
}

async fn react<A: AuthApi>(
    manager: SessionManager<A>,
    mut events: tokio::sync::broadcast::Receiver<SessionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::TokenRefreshNeeded) => {
                let refreshed = manager.handle_refresh_needed().await;
                debug!(refreshed, "scheduled refresh handled");
            }
            Ok(SessionEvent::SessionExpired { .. }) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "session event reactor lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

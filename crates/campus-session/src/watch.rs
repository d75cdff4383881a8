//! Periodic validity check.
//!
//! The refresh timer only fires near the token's `exp`, so a session that
//! crosses its absolute expiry or inactivity limit in between would go
//! unnoticed. The watch re-checks on a fixed interval.

use std::time::Duration;

use campus_refresh::AuthApi;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::SessionManager;

/// Periodically runs [`SessionManager::check_validity`] while the context
/// is authenticated.
pub struct ExpiryWatch;

impl ExpiryWatch {
    /// Spawns the watch. The first check happens one `interval` from now.
    pub fn spawn<A: AuthApi>(manager: SessionManager<A>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            // A laptop waking from sleep gets one check, not a burst.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if manager.is_authenticated() && !manager.check_validity() {
                    debug!("watch found the session expired");
                }
            }
        })
    }
}

//! Cross-context logout propagation.
//!
//! When one context logs out (or expires), it removes `auth_session` from
//! the shared durable tier. Every other context attached to the same
//! [`SharedStorage`](campus_store::SharedStorage) sees that removal on its
//! [`StorageListener`] and drops its own session state.

use campus_refresh::AuthApi;
use campus_store::keys::AUTH_SESSION;
use campus_store::{StorageEvent, StorageListener};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::SessionManager;

/// Whether `event` means the shared session went away.
///
/// Only a present → absent transition of `auth_session` counts; writes,
/// overwrites and other keys don't.
pub fn is_session_cleared(event: &StorageEvent) -> bool {
    event.key == AUTH_SESSION && event.old_value.is_some() && event.new_value.is_none()
}

/// Follows another context's logout.
pub struct CrossTabSync;

impl CrossTabSync {
    /// Spawns the listener task. It ends when the storage bus closes.
    pub fn spawn<A: AuthApi>(mut listener: StorageListener, manager: SessionManager<A>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = listener.recv().await {
                if is_session_cleared(&event) {
                    debug!(origin = %event.origin, "shared session removed");
                    manager.handle_cleared_elsewhere();
                }
            }
            debug!("storage bus closed, cross-context sync stopped");
        })
    }
}

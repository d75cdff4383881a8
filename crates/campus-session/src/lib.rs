//! # campus-session
//!
//! Client-side session lifecycle for the campus portal.
//!
//! A [`SessionManager`] keeps one authenticated session per context
//! (browser tab, desktop window, CLI process): it persists the session in a
//! durable or ephemeral store, refreshes the access token shortly before it
//! expires, hard-expires sessions that outlive their absolute lifetime or
//! sit idle too long, and follows logouts made in other contexts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use campus_session::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let api = HttpAuthApi::new(AuthApiConfig::new("https://portal.example/api".parse()?)?);
//! let manager = SessionManagerBuilder::new()
//!     .durable(FileStore::open("session.json")?)
//!     .build(api);
//!
//! let runtime = manager.start();
//! if manager.restore_session().is_none() {
//!     // show the login page, then:
//!     // manager.save_session(token, refresh, user, remember_me)?;
//! }
//! let mut events = manager.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let SessionEvent::SessionExpired { reason } = event {
//!         println!("signed out: {reason}");
//!         break;
//!     }
//! }
//! runtime.shutdown();
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod manager;
mod runtime;
mod sync;
pub mod telemetry;
mod watch;

pub use config::SessionPolicy;
pub use error::SessionError;
pub use manager::{AuthState, SessionManager, SessionManagerBuilder};
pub use runtime::SessionRuntime;
pub use sync::{CrossTabSync, is_session_cleared};
pub use watch::ExpiryWatch;

/// The types most hosts need.
pub mod prelude {
    pub use campus_refresh::{AuthApi, AuthApiConfig, HttpAuthApi, RefreshError, RefreshResponse};
    pub use campus_store::{FileStore, MemoryStore, Role, SessionRecord, SharedStorage, UserSnapshot};
    pub use campus_timer::{Interaction, Visibility};
    pub use campus_token::{ExpiryReason, SessionEvent};

    pub use crate::{AuthState, SessionError, SessionManager, SessionManagerBuilder, SessionPolicy};
}

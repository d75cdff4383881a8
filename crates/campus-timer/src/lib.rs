//! Time-driven parts of the campus session.
//!
//! - [`ExpiryScheduler`]: one timer per session that announces
//!   [`SessionEvent::TokenRefreshNeeded`](campus_token::SessionEvent) a lead
//!   time before the access token's `exp`.
//! - [`ActivityTracker`]: turns a stream of raw interactions into at most
//!   one "user was here" stamp per burst.
//!
//! Both run on Tokio time, so tests drive them with
//! `#[tokio::test(start_paused = true)]`.

mod activity;
mod scheduler;

pub use activity::{ActivityConfig, ActivityHandle, ActivitySink, ActivityTracker, Interaction, Visibility};
pub use scheduler::{DEFAULT_LEAD_TIME, ExpiryScheduler, ScheduleOutcome};

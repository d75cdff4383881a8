//! Shared vocabulary for the campus session layers.
//!
//! This crate holds the pieces every other layer needs:
//!
//! - **Claims** ([`decode`], [`is_expired`], [`expiry_time_millis`]):
//!   read the expiry out of a bearer token without contacting the server.
//! - **Clocks** ([`Clock`], [`SystemClock`], [`ManualClock`]): where
//!   "now" comes from, so expiry math can be tested deterministically.
//! - **Events** ([`SessionEvent`], [`ExpiryReason`]): the signals the
//!   session layer broadcasts to the rest of the application.
//!
//! # Architecture
//!
//! ```text
//! Session facade (campus-session)
//!     ↕
//! Timer / Refresh / Store layers
//!     ↕
//! Token layer (this crate)  ← no I/O, no runtime, pure functions
//! ```

mod claims;
mod clock;
mod event;

pub use claims::{
    TokenClaims, decode, expires_at, expiry_time_millis, is_expired,
    is_expired_at, unsigned_token,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{ExpiryReason, SessionEvent};

//! Token refresh for the campus portal.
//!
//! - **The auth API seam** ([`AuthApi`]): the two endpoints the session
//!   layer needs: mint a new access token, fetch the canonical user.
//!   [`HttpAuthApi`] talks to the real server; tests plug in fakes.
//! - **Single-flight refresh** ([`RefreshCoordinator`]): when several
//!   callers notice an expiring token at once, only one network call goes
//!   out and everyone gets its result.

mod api;
mod coordinator;
mod error;
mod http;

pub use api::{AuthApi, RefreshResponse};
pub use coordinator::RefreshCoordinator;
pub use error::RefreshError;
pub use http::{AuthApiConfig, HttpAuthApi};

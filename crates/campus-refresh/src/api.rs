//! The auth API seam.
//!
//! A session needs two things from the server: a fresh access token for a
//! refresh token, and the current user for an access token. Production
//! code uses [`HttpAuthApi`](crate::HttpAuthApi) and tests
//! use an in-memory fake.

use std::future::Future;

use campus_store::UserSnapshot;
use serde::{Deserialize, Serialize};

use crate::RefreshError;

/// Body of a successful `POST /auth/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// The new access token.
    #[serde(alias = "accessToken")]
    pub token: String,

    /// A rotated refresh token. `None` means the old one stays valid.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// The portal's authentication endpoints.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one client is shared (behind an `Arc`) by
///   the facade and its background tasks.
/// - The returned futures are `Send` → a refresh runs as its own Tokio
///   task.
pub trait AuthApi: Send + Sync + 'static {
    /// Exchanges `refresh_token` for a new access token.
    ///
    /// # Errors
    /// - [`RefreshError::Rejected`]: the server refused the token
    /// - [`RefreshError::Transport`] / [`RefreshError::Decode`]: the
    ///   server was unreachable or answered garbage
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshResponse, RefreshError>> + Send;

    /// Fetches the canonical user for `access_token`.
    ///
    /// # Errors
    /// Same as [`refresh`](Self::refresh).
    fn me(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<UserSnapshot, RefreshError>> + Send;
}

//! Session events broadcast to the rest of the application.
//!
//! Whoever owns "is the user logged in?" (a UI shell, a CLI, an API
//! client) subscribes to these and reacts, typically by redirecting to
//! the login surface on [`SessionEvent::SessionExpired`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a session was invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// `absoluteExpiry` has passed.
    AbsoluteExpiry,
    /// No recorded activity within the inactivity limit.
    Inactivity,
    /// The refresh endpoint rejected the refresh token, or could not be
    /// reached.
    RefreshFailed,
    /// Another context sharing the durable store cleared the session.
    ClearedElsewhere,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AbsoluteExpiry => "absolute expiry reached",
            Self::Inactivity => "inactivity limit exceeded",
            Self::RefreshFailed => "token refresh failed",
            Self::ClearedElsewhere => "cleared in another context",
        };
        f.write_str(text)
    }
}

/// A signal raised by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// The session was hard-invalidated. The user is now anonymous.
    SessionExpired { reason: ExpiryReason },

    /// The access token is about to expire and should be refreshed.
    TokenRefreshNeeded,
}

//! Error types for the refresh layer.

/// Why a refresh (or a user re-fetch) didn't succeed.
///
/// `Clone` because one refresh outcome is shared by every caller that
/// joined the in-flight attempt. Inner errors are therefore kept as their
/// rendered messages rather than as source errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// There is no session, so there's no refresh token to use.
    #[error("no session to refresh")]
    NoSession,

    /// The auth server answered with a non-success status.
    #[error("{operation} rejected with status {status}: {detail}")]
    Rejected {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    /// The auth server could not be reached (DNS, connect, timeout, ...).
    #[error("auth API unreachable: {0}")]
    Transport(String),

    /// The auth server answered 2xx but the body wasn't what we expected.
    #[error("unexpected auth API response: {0}")]
    Decode(String),

    /// The new tokens couldn't be written to storage.
    #[error("failed to persist refreshed session: {0}")]
    Storage(String),

    /// The refresh task panicked or was cancelled by the runtime.
    #[error("refresh task aborted: {0}")]
    Aborted(String),
}

impl RefreshError {
    /// Whether the server explicitly refused the credentials (401/403), as
    /// opposed to a transient failure.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Rejected { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for RefreshError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<campus_store::StoreError> for RefreshError {
    fn from(e: campus_store::StoreError) -> Self {
        Self::Storage(e.to_string())
    }
}

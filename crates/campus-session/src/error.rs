//! Unified error type for the session layer.

use campus_refresh::RefreshError;
use campus_store::StoreError;

/// Top-level error that wraps the lower crates' errors.
///
/// Only storage failures and refresh failures reach callers; an expired or
/// missing session is reported through return values and events instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A storage tier couldn't be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A token refresh failed.
    #[error(transparent)]
    Refresh(#[from] RefreshError),
}

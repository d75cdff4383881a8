//! Fixed storage keys.
//!
//! The names match what the portal's web client has always used, so a
//! record written by one client can be read by another.

/// The JSON-encoded [`SessionRecord`](crate::SessionRecord).
pub const AUTH_SESSION: &str = "auth_session";

/// Flat copy of the access token.
pub const AUTH_TOKEN: &str = "auth_token";

/// Flat copy of the refresh token.
pub const REFRESH_TOKEN: &str = "refresh_token";

/// Flat JSON copy of the user snapshot.
pub const USER_DATA: &str = "user_data";

/// Presence marker, durable store only.
pub const AUTH_BACKUP: &str = "auth_backup";

/// UI theme preference. Survives logout.
pub const THEME: &str = "theme";

/// Sidebar collapsed/expanded preference. Survives logout.
pub const SIDEBAR_STATE: &str = "sidebar_state";

/// The keys that make up one session in either store.
pub const CANONICAL: [&str; 4] = [AUTH_SESSION, AUTH_TOKEN, REFRESH_TOKEN, USER_DATA];

//! Session records: the persisted shape of one login.
//!
//! A [`SessionRecord`] is what the client remembers about an authenticated
//! user between page loads (or process restarts):
//! - WHICH credentials to send (access + refresh token)
//! - WHO is logged in (a cached [`UserSnapshot`])
//! - HOW LONG the login may live (`absolute_expiry`, `last_activity`)
//! - WHERE it is stored (`remember_me` picks durable vs ephemeral)

use std::time::Duration;

use campus_token::ExpiryReason;
use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

// ---------------------------------------------------------------------------
// UserSnapshot
// ---------------------------------------------------------------------------

/// What a portal user is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    Coordinator,
    Admin,
    /// A role this client doesn't know yet. Kept so that a newer server
    /// can't break session restore on an older client.
    #[default]
    #[serde(other)]
    Unknown,
}

/// A denormalized copy of the authenticated user.
///
/// Cached so the UI can render a name and role without a round trip. It may
/// lag behind the server's copy; the session facade's `verify_user`
/// refreshes it in the background.
///
/// Fields this client doesn't model (department, roll number, avatar, ...)
/// are kept verbatim in `profile` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    /// Server-side identifier. The API emits it as `_id`.
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(flatten)]
    pub profile: Map<String, JsonValue>,
}

impl UserSnapshot {
    /// Creates a snapshot with no extra profile fields.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            role,
            profile: Map::new(),
        }
    }

    /// Adds one profile field.
    #[must_use]
    pub fn with_profile_field(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.profile.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// SessionRecord
// ---------------------------------------------------------------------------

/// The unit of persisted authentication state.
///
/// Stored as camelCase JSON under [`keys::AUTH_SESSION`](crate::keys::AUTH_SESSION),
/// timestamps as epoch milliseconds.
///
/// ## Validity
///
/// Two independent clocks must both be satisfied:
///
/// ```text
///   now < absolute_expiry                      (hard cap on login lifetime)
///   now - last_activity < inactivity_limit     (idle cap)
/// ```
///
/// The access token's own `exp` claim is NOT part of validity. It only
/// decides when to refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Random 128-bit id (32 hex chars), fixed for the life of the login.
    pub session_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSnapshot,
    #[serde(with = "ts_milliseconds")]
    pub absolute_expiry: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub last_activity: DateTime<Utc>,
    /// Login time.
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last successful token rotation.
    #[serde(default, with = "ts_milliseconds_option")]
    pub refreshed_at: Option<DateTime<Utc>>,
    pub remember_me: bool,
}

impl SessionRecord {
    /// Builds the record for a fresh login at `now`, valid for `lifetime`.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user: UserSnapshot,
        remember_me: bool,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            session_id: generate_session_id(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            user,
            absolute_expiry: offset(now, lifetime),
            last_activity: now,
            created_at: now,
            refreshed_at: None,
            remember_me,
        }
    }

    /// Checks both validity clocks at `now`.
    ///
    /// # Errors
    /// - [`ExpiryReason::AbsoluteExpiry`] if `now >= absolute_expiry`
    ///   (reported first when both checks fail)
    /// - [`ExpiryReason::Inactivity`] if the record has been idle for
    ///   `inactivity_limit` or longer
    pub fn validity(
        &self,
        now: DateTime<Utc>,
        inactivity_limit: Duration,
    ) -> Result<(), ExpiryReason> {
        if now >= self.absolute_expiry {
            return Err(ExpiryReason::AbsoluteExpiry);
        }
        if self.idle_for(now) >= inactivity_limit {
            return Err(ExpiryReason::Inactivity);
        }
        Ok(())
    }

    /// How long since the last recorded activity. Zero if the clock went
    /// backwards.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_activity).to_std().unwrap_or(Duration::ZERO)
    }

    /// Time left before `absolute_expiry`. Zero once it has passed.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        (self.absolute_expiry - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Stamps activity at `now`. Never moves `last_activity` backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = self.last_activity.max(now);
    }

    /// Pushes `absolute_expiry` to `now + lifetime` and stamps activity.
    pub fn extend(&mut self, now: DateTime<Utc>, lifetime: Duration) {
        self.absolute_expiry = offset(now, lifetime);
        self.touch(now);
    }

    /// Replaces the tokens after a successful refresh.
    ///
    /// When the server doesn't return a new refresh token, the old one
    /// stays valid and is kept.
    pub fn rotate(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.access_token = access_token;
        if let Some(refresh_token) = refresh_token {
            self.refresh_token = refresh_token;
        }
        self.refreshed_at = Some(now);
    }

    /// The presence marker written alongside this record.
    pub fn marker(&self) -> BackupMarker {
        BackupMarker {
            has_session: true,
            remember_me: self.remember_me,
            last_login: self.created_at,
            session_id: self.session_id.clone(),
        }
    }
}

/// `now + lifetime`, saturating at the far future instead of overflowing.
fn offset(now: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lifetime)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Generates a random 32-character hex string (128 bits of entropy).
fn generate_session_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// BackupMarker
// ---------------------------------------------------------------------------

/// A small "someone is logged in" marker, always kept in the durable store.
///
/// Ephemeral sessions live in a per-context store that other contexts (and
/// a restarted process) can't see. The marker lets them detect that a
/// session exists somewhere without holding its tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMarker {
    pub has_session: bool,
    pub remember_me: bool,
    #[serde(with = "ts_milliseconds")]
    pub last_login: DateTime<Utc>,
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);
    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn record_at(now: DateTime<Utc>) -> SessionRecord {
        SessionRecord::new(
            "access",
            "refresh",
            UserSnapshot::new("u-1", "Asha", "asha@uni.example", Role::Student),
            true,
            now,
            DAY,
        )
    }

    #[test]
    fn test_new_sets_timestamps_and_random_id() {
        let now = at(1_000_000);
        let a = record_at(now);
        let b = record_at(now);

        assert_eq!(a.absolute_expiry, now + TimeDelta::days(1));
        assert_eq!(a.last_activity, now);
        assert_eq!(a.created_at, now);
        assert_eq!(a.refreshed_at, None);
        assert_eq!(a.session_id.len(), 32);
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_validity_fresh_record_is_valid() {
        let now = at(1_000_000);
        assert_eq!(record_at(now).validity(now, WEEK), Ok(()));
    }

    #[test]
    fn test_validity_absolute_expiry_wins_even_when_active() {
        let now = at(1_000_000);
        let mut record = record_at(now);
        let later = now + TimeDelta::days(2);
        record.touch(later);

        assert_eq!(record.validity(later, WEEK), Err(ExpiryReason::AbsoluteExpiry));
    }

    #[test]
    fn test_validity_inactivity_fails_before_absolute_expiry() {
        let now = at(1_000_000);
        let record = record_at(now);
        let later = now + TimeDelta::hours(2);

        assert_eq!(
            record.validity(later, Duration::from_secs(3600)),
            Err(ExpiryReason::Inactivity)
        );
    }

    #[test]
    fn test_validity_idle_exactly_at_limit_is_inactive() {
        let now = at(1_000_000);
        let record = record_at(now);
        let later = now + TimeDelta::seconds(60);

        assert_eq!(
            record.validity(later, Duration::from_secs(60)),
            Err(ExpiryReason::Inactivity)
        );
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let now = at(1_000_000);
        let mut record = record_at(now);

        record.touch(now - TimeDelta::minutes(5));

        assert_eq!(record.last_activity, now);
    }

    #[test]
    fn test_extend_pushes_expiry_from_now() {
        let now = at(1_000_000);
        let mut record = record_at(now);
        let later = now + TimeDelta::hours(20);

        record.extend(later, DAY);

        assert_eq!(record.absolute_expiry, later + TimeDelta::days(1));
        assert_eq!(record.last_activity, later);
    }

    #[test]
    fn test_extend_with_huge_lifetime_saturates() {
        let mut record = record_at(at(0));
        record.extend(at(0), Duration::MAX);
        assert_eq!(record.absolute_expiry, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_rotate_without_new_refresh_token_keeps_old_one() {
        let now = at(1_000_000);
        let mut record = record_at(now);

        record.rotate("access-2".into(), None, now);

        assert_eq!(record.access_token, "access-2");
        assert_eq!(record.refresh_token, "refresh");
        assert_eq!(record.refreshed_at, Some(now));
    }

    #[test]
    fn test_time_until_expiry_saturates_at_zero() {
        let now = at(1_000_000);
        let record = record_at(now);

        assert_eq!(record.time_until_expiry(now), DAY);
        assert_eq!(record.time_until_expiry(now + TimeDelta::days(3)), Duration::ZERO);
    }

    #[test]
    fn test_serialized_record_uses_camel_case_millis() {
        let record = record_at(at(1_000));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["accessToken"], "access");
        assert_eq!(json["refreshToken"], "refresh");
        assert_eq!(json["rememberMe"], true);
        assert_eq!(json["lastActivity"], 1_000_000);
        assert_eq!(json["absoluteExpiry"], 1_000_000 + 86_400_000);
        assert_eq!(json["user"]["role"], "student");
    }

    #[test]
    fn test_user_snapshot_accepts_api_shape() {
        let user: UserSnapshot = serde_json::from_value(json!({
            "_id": "665f1c",
            "name": "Dr. Rao",
            "email": "rao@uni.example",
            "role": "faculty",
            "department": "CSE",
        }))
        .unwrap();

        assert_eq!(user.id, "665f1c");
        assert_eq!(user.role, Role::Faculty);
        assert_eq!(user.profile.get("department"), Some(&json!("CSE")));
    }

    #[test]
    fn test_user_snapshot_unknown_role_is_tolerated() {
        let user: UserSnapshot =
            serde_json::from_value(json!({ "id": "x", "role": "external-examiner" })).unwrap();
        assert_eq!(user.role, Role::Unknown);
    }

    #[test]
    fn test_marker_mirrors_record() {
        let record = record_at(at(5));
        let marker = record.marker();

        assert!(marker.has_session);
        assert!(marker.remember_me);
        assert_eq!(marker.last_login, at(5));
        assert_eq!(marker.session_id, record.session_id);
    }
}

//! Inspection-only decoding of bearer-token claims.
//!
//! The portal's access tokens are JWTs: three base64url segments joined by
//! dots (`header.payload.signature`). The client never verifies the
//! signature; that's the server's job. It only peeks at the payload to
//! learn WHEN the token expires, so it can refresh ahead of time.
//!
//! Every function here is total: malformed input produces `None` (or
//! "expired"), never a panic and never an error the caller has to handle.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::Clock;

/// The decoded payload segment of a bearer token.
///
/// Only a handful of claims matter to the session layer (`exp`, `iat`,
/// `sub`); everything else is kept as raw JSON so callers can still reach
/// application-specific claims through [`get_claim`](Self::get_claim).
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    inner: JsonValue,
}

impl TokenClaims {
    /// Expiry as seconds since the Unix epoch.
    ///
    /// Accepts integer and fractional encodings (some issuers emit
    /// `1700000000.5`); a fractional value is truncated. Returns `None` if
    /// the claim is missing or not a number.
    #[must_use]
    pub fn exp(&self) -> Option<i64> {
        numeric_claim(self.inner.get("exp")?)
    }

    /// Issued-at as seconds since the Unix epoch.
    #[must_use]
    pub fn issued_at(&self) -> Option<i64> {
        numeric_claim(self.inner.get("iat")?)
    }

    /// The `sub` claim, when it is a string.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.inner.get("sub").and_then(JsonValue::as_str)
    }

    /// Gets a claim value by key.
    #[must_use]
    pub fn get_claim(&self, key: &str) -> Option<&JsonValue> {
        self.inner.get(key)
    }

    /// Gets the inner JSON object.
    #[must_use]
    pub fn as_json(&self) -> &JsonValue {
        &self.inner
    }
}

fn numeric_claim(value: &JsonValue) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|secs| secs as i64))
}

/// Decodes the payload segment of `token` without verifying anything.
///
/// Returns `None` when:
/// - the token does not have exactly three dot-separated segments,
/// - the middle segment is not valid base64 (url-safe or standard, padded
///   or not),
/// - the decoded bytes are not JSON, or the JSON is not an object.
#[must_use]
pub fn decode(token: &str) -> Option<TokenClaims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;

    let inner: JsonValue = serde_json::from_slice(&bytes).ok()?;
    inner.is_object().then_some(TokenClaims { inner })
}

/// The token's expiry as a millisecond Unix timestamp, for scheduling.
#[must_use]
pub fn expiry_time_millis(token: &str) -> Option<i64> {
    decode(token)?.exp()?.checked_mul(1000)
}

/// The token's expiry as a UTC timestamp.
#[must_use]
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(expiry_time_millis(token)?)
}

/// Whether `token` is expired at `now`.
///
/// Fails safe: an undecodable token, or one without a numeric `exp`, is
/// reported as expired. A token whose expiry equals `now` is expired.
#[must_use]
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match expiry_time_millis(token) {
        Some(expiry_ms) => expiry_ms <= now.timestamp_millis(),
        None => true,
    }
}

/// Whether `token` is expired according to `clock`.
#[must_use]
pub fn is_expired(token: &str, clock: &(impl Clock + ?Sized)) -> bool {
    is_expired_at(token, clock.now())
}

/// Builds an unsigned three-segment token carrying `claims`.
///
/// The signature segment is empty. Useful for local fakes of the auth API
/// and for tests; no server will accept it.
#[must_use]
pub fn unsigned_token(claims: &JsonValue) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}

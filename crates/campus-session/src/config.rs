//! Session policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lifetimes and intervals that govern a session.
///
/// Durations are (de)serialized as whole seconds, so a host can load the
/// policy from JSON. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionPolicy {
    /// Absolute lifetime of a "remember me" session. Default: 30 days.
    #[serde(with = "secs")]
    pub remembered_lifetime: Duration,
    /// Absolute lifetime of a session without "remember me". Default: 24 h.
    #[serde(with = "secs")]
    pub ephemeral_lifetime: Duration,
    /// Idle time after which the session is hard-expired. Default: 7 days.
    #[serde(with = "secs")]
    pub inactivity_limit: Duration,
    /// How long before the access token's `exp` to refresh it.
    /// Default: 5 minutes.
    #[serde(with = "secs")]
    pub refresh_lead_time: Duration,
    /// Quiet period before an interaction burst is stamped. Default: 30 s.
    #[serde(with = "secs")]
    pub activity_debounce: Duration,
    /// How often the background watch re-checks validity. Default: 60 s.
    #[serde(with = "secs")]
    pub watch_interval: Duration,
}

const DAY: u64 = 24 * 60 * 60;

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            remembered_lifetime: Duration::from_secs(30 * DAY),
            ephemeral_lifetime: Duration::from_secs(DAY),
            inactivity_limit: Duration::from_secs(7 * DAY),
            refresh_lead_time: campus_timer::DEFAULT_LEAD_TIME,
            activity_debounce: campus_timer::ActivityConfig::DEFAULT_DEBOUNCE,
            watch_interval: Duration::from_secs(60),
        }
    }
}

impl SessionPolicy {
    /// Shortest accepted watch interval.
    pub const MIN_WATCH_INTERVAL: Duration = Duration::from_secs(1);

    /// The absolute lifetime for a session with the given `remember_me`.
    pub fn lifetime(&self, remember_me: bool) -> Duration {
        if remember_me {
            self.remembered_lifetime
        } else {
            self.ephemeral_lifetime
        }
    }

    /// Replaces values that would make the session unusable.
    ///
    /// Called by the session builder. Rules:
    /// - zero lifetimes and a zero inactivity limit fall back to defaults
    /// - `watch_interval` is at least [`Self::MIN_WATCH_INTERVAL`]
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        for (name, value, fallback) in [
            ("remembered_lifetime", &mut self.remembered_lifetime, defaults.remembered_lifetime),
            ("ephemeral_lifetime", &mut self.ephemeral_lifetime, defaults.ephemeral_lifetime),
            ("inactivity_limit", &mut self.inactivity_limit, defaults.inactivity_limit),
        ] {
            if value.is_zero() {
                warn!(field = name, "zero duration in session policy, using default");
                *value = fallback;
            }
        }
        if self.watch_interval < Self::MIN_WATCH_INTERVAL {
            warn!(
                interval_ms = self.watch_interval.as_millis() as u64,
                "watch_interval below minimum, clamping"
            );
            self.watch_interval = Self::MIN_WATCH_INTERVAL;
        }
        self
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

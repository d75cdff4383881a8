//! The dual-store persistor: one session record, two storage tiers.
//!
//! ```text
//!            save(record)
//!                 │
//!     remember_me?├── yes ──→ durable   (survives restarts)
//!                 └── no  ──→ ephemeral (dies with the context)
//!
//!            load()
//!                 │
//!     durable ────┴──→ ephemeral ──→ None
//!     (checked first)
//! ```
//!
//! Both tiers are plain [`KeyValueStore`]s, so the precedence order lives
//! here and nowhere else.

use std::sync::Arc;

use crate::keys::{self, AUTH_BACKUP, AUTH_SESSION, AUTH_TOKEN, REFRESH_TOKEN, USER_DATA};
use crate::{BackupMarker, KeyValueStore, SessionRecord, StoreError};

/// UI preferences stored next to the session but never cleared with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    Theme,
    SidebarState,
}

impl Preference {
    fn key(self) -> &'static str {
        match self {
            Self::Theme => keys::THEME,
            Self::SidebarState => keys::SIDEBAR_STATE,
        }
    }
}

/// Reads and writes the canonical [`SessionRecord`].
///
/// Cheap to clone; clones share the same stores.
#[derive(Clone)]
pub struct Persistor {
    durable: Arc<dyn KeyValueStore>,
    ephemeral: Arc<dyn KeyValueStore>,
}

impl Persistor {
    /// Creates a persistor over a durable and an ephemeral tier.
    pub fn new(durable: Arc<dyn KeyValueStore>, ephemeral: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, ephemeral }
    }

    /// Stores `record` in the tier picked by `record.remember_me`.
    ///
    /// Writes the JSON blob plus the flat token/user keys, removes any copy
    /// from the other tier (a new login supersedes both), and writes the
    /// backup marker to the durable tier even for ephemeral sessions.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if a tier can't be written.
    pub fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let (target, other) = if record.remember_me {
            (&self.durable, &self.ephemeral)
        } else {
            (&self.ephemeral, &self.durable)
        };

        let blob = serde_json::to_string(record).map_err(StoreError::Encode)?;
        let user = serde_json::to_string(&record.user).map_err(StoreError::Encode)?;
        let marker = serde_json::to_string(&record.marker()).map_err(StoreError::Encode)?;

        for key in keys::CANONICAL {
            other.remove(key)?;
        }
        target.set(AUTH_SESSION, &blob)?;
        target.set(AUTH_TOKEN, &record.access_token)?;
        target.set(REFRESH_TOKEN, &record.refresh_token)?;
        target.set(USER_DATA, &user)?;
        self.durable.set(AUTH_BACKUP, &marker)?;

        tracing::debug!(
            session_id = %record.session_id,
            remember_me = record.remember_me,
            "session record saved"
        );
        Ok(())
    }

    /// Loads the canonical record, durable tier first.
    ///
    /// A blob that fails to parse, or a tier that fails to read, is logged
    /// and skipped. Returns `None` if neither tier holds a usable record.
    pub fn load(&self) -> Option<SessionRecord> {
        [("durable", &self.durable), ("ephemeral", &self.ephemeral)]
            .into_iter()
            .find_map(|(tier, store)| read_record(tier, &**store))
    }

    /// Removes the session from both tiers, along with the backup marker.
    ///
    /// Preferences are left alone. Absent keys are not an error.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if a tier can't be written.
    pub fn clear(&self) -> Result<(), StoreError> {
        for key in keys::CANONICAL {
            self.durable.remove(key)?;
            self.ephemeral.remove(key)?;
        }
        self.durable.remove(AUTH_BACKUP)?;
        tracing::debug!("session record cleared");
        Ok(())
    }

    /// Removes the session from the ephemeral tier only.
    ///
    /// Used when another context already cleared the shared durable tier;
    /// the durable tier and the backup marker are not touched.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the ephemeral tier can't be written.
    pub fn clear_ephemeral(&self) -> Result<(), StoreError> {
        for key in keys::CANONICAL {
            self.ephemeral.remove(key)?;
        }
        tracing::debug!("ephemeral session record cleared");
        Ok(())
    }

    /// The durable presence marker, if one is stored and parses.
    pub fn backup_marker(&self) -> Option<BackupMarker> {
        let raw = self.durable.get(AUTH_BACKUP).ok()??;
        serde_json::from_str(&raw).ok()
    }

    /// The flat access-token copy, durable tier first.
    ///
    /// This is what an HTTP client reads to attach a bearer header; it
    /// avoids parsing the whole record on every request.
    pub fn access_token(&self) -> Option<String> {
        [&self.durable, &self.ephemeral]
            .into_iter()
            .find_map(|store| store.get(AUTH_TOKEN).ok().flatten())
    }

    /// Reads a UI preference from the durable tier.
    pub fn preference(&self, preference: Preference) -> Option<String> {
        self.durable.get(preference.key()).ok().flatten()
    }

    /// Writes a UI preference to the durable tier.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the durable tier can't be written.
    pub fn set_preference(&self, preference: Preference, value: &str) -> Result<(), StoreError> {
        self.durable.set(preference.key(), value)
    }
}

fn read_record(tier: &'static str, store: &dyn KeyValueStore) -> Option<SessionRecord> {
    let raw = match store.get(AUTH_SESSION) {
        Ok(raw) => raw?,
        Err(e) => {
            tracing::warn!(tier, error = %e, "failed to read session record");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(tier, error = %e, "stored session record is corrupt, ignoring");
            None
        }
    }
}

//! The session facade.
//!
//! `SessionManager` composes the persistor, the expiry scheduler, the
//! refresh coordinator and the auth API into the operations the rest of
//! the portal calls: save on login, restore on startup, clear on logout,
//! extend when the user is visibly busy.
//!
//! ```text
//!   Anonymous ──save_session──→ Active ──┬── activity / refresh ok ──→ Active
//!       ▲                                │
//!       └──── logout | refresh failed | absolute expiry
//!             | inactivity | cleared in another context
//! ```
//!
//! Every path back to Anonymous except logout broadcasts
//! [`SessionEvent::SessionExpired`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use campus_refresh::{AuthApi, RefreshCoordinator, RefreshError, RefreshResponse};
use campus_store::{
    KeyValueStore, MemoryStore, Persistor, SessionRecord, StorageContext, UserSnapshot,
};
use campus_timer::{ActivitySink, ExpiryScheduler, ScheduleOutcome};
use campus_token::{Clock, ExpiryReason, SessionEvent, SystemClock};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{SessionError, SessionPolicy};

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 32;

/// Whether this context currently holds a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Anonymous,
    Active,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`SessionManager`].
///
/// # Example
///
/// ```rust,ignore
/// let manager = SessionManagerBuilder::new()
///     .durable(FileStore::open("session.json")?)
///     .policy(SessionPolicy::default())
///     .build(HttpAuthApi::new(config));
/// ```
pub struct SessionManagerBuilder {
    durable: Option<Arc<dyn KeyValueStore>>,
    shared: Option<StorageContext>,
    ephemeral: Option<Arc<dyn KeyValueStore>>,
    policy: SessionPolicy,
    clock: Arc<dyn Clock>,
}

impl SessionManagerBuilder {
    /// Creates a builder with in-memory stores, the default policy and the
    /// system clock.
    pub fn new() -> Self {
        Self {
            durable: None,
            shared: None,
            ephemeral: None,
            policy: SessionPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Uses `store` as the durable tier ("remember me" sessions).
    pub fn durable(mut self, store: impl KeyValueStore) -> Self {
        self.durable = Some(Arc::new(store));
        self.shared = None;
        self
    }

    /// Uses a shared context as the durable tier. The runtime started with
    /// [`SessionManager::start`] then follows logouts in other contexts.
    pub fn shared_durable(mut self, context: StorageContext) -> Self {
        self.durable = Some(Arc::new(context.clone()));
        self.shared = Some(context);
        self
    }

    /// Uses `store` as the ephemeral tier.
    pub fn ephemeral(mut self, store: impl KeyValueStore) -> Self {
        self.ephemeral = Some(Arc::new(store));
        self
    }

    pub fn policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the manager around `api`. Starts out anonymous; call
    /// [`SessionManager::restore_session`] to pick up a stored session.
    pub fn build<A: AuthApi>(self, api: A) -> SessionManager<A> {
        let durable: Arc<dyn KeyValueStore> = match self.durable {
            Some(store) => store,
            None => {
                debug!("no durable store configured, using memory");
                Arc::new(MemoryStore::new())
            }
        };
        let ephemeral: Arc<dyn KeyValueStore> = match self.ephemeral {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let policy = self.policy.validated();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let scheduler =
            ExpiryScheduler::new(Arc::clone(&self.clock), policy.refresh_lead_time, events.clone());

        SessionManager {
            inner: Arc::new(Inner {
                api,
                persistor: Persistor::new(durable, ephemeral),
                shared: self.shared,
                clock: self.clock,
                policy,
                scheduler,
                coordinator: RefreshCoordinator::new(),
                events,
                state: Mutex::new(AuthState::Anonymous),
            }),
        }
    }
}

impl Default for SessionManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

struct Inner<A> {
    api: A,
    persistor: Persistor,
    shared: Option<StorageContext>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
    scheduler: ExpiryScheduler,
    coordinator: RefreshCoordinator,
    events: broadcast::Sender<SessionEvent>,
    /// Also serializes read-modify-write cycles on the stored record.
    state: Mutex<AuthState>,
}

/// The session facade for one context.
///
/// Cheap to clone; clones share all state. Timers need a Tokio runtime;
/// every other operation is usable without one.
pub struct SessionManager<A: AuthApi> {
    inner: Arc<Inner<A>>,
}

impl<A: AuthApi> Clone for SessionManager<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: AuthApi> SessionManager<A> {
    fn lock_state(&self) -> MutexGuard<'_, AuthState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Persists a fresh login and arms the refresh timer.
    ///
    /// Replaces any previous session in either tier.
    ///
    /// # Errors
    /// Returns [`SessionError::Store`] if the record can't be written; the
    /// context stays anonymous in that case.
    pub fn save_session(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user: UserSnapshot,
        remember_me: bool,
    ) -> Result<SessionRecord, SessionError> {
        let now = self.now();
        let record = SessionRecord::new(
            access_token,
            refresh_token,
            user,
            remember_me,
            now,
            self.inner.policy.lifetime(remember_me),
        );
        {
            let mut state = self.lock_state();
            self.inner.persistor.save(&record)?;
            *state = AuthState::Active;
        }
        self.arm(&record.access_token);
        info!(
            session_id = %record.session_id,
            user_id = %record.user.id,
            remember_me,
            "session saved"
        );
        Ok(record)
    }

    /// Picks up the stored session, if it's still valid.
    ///
    /// An expired or idle-too-long session is cleared and reported with
    /// [`SessionEvent::SessionExpired`]; `None` is returned. A valid one is
    /// stamped active, its refresh timer re-armed, and returned.
    pub fn restore_session(&self) -> Option<SessionRecord> {
        let now = self.now();
        let mut state = self.lock_state();
        let Some(mut record) = self.inner.persistor.load() else {
            self.inner.scheduler.cancel();
            *state = AuthState::Anonymous;
            debug!("no stored session");
            return None;
        };
        if let Err(reason) = record.validity(now, self.inner.policy.inactivity_limit) {
            self.expire_locked(state, reason, true);
            return None;
        }

        record.touch(now);
        if let Err(e) = self.inner.persistor.save(&record) {
            warn!(error = %e, "failed to stamp restored session");
        }
        *state = AuthState::Active;
        drop(state);

        self.arm(&record.access_token);
        info!(session_id = %record.session_id, user_id = %record.user.id, "session restored");
        Some(record)
    }

    /// Logs out: removes the session from both tiers and stops the refresh
    /// timer. No event is broadcast; the caller initiated it.
    ///
    /// # Errors
    /// Returns [`SessionError::Store`] if a tier can't be written. The
    /// context is anonymous afterwards either way.
    pub fn clear_session(&self) -> Result<(), SessionError> {
        let mut state = self.lock_state();
        self.inner.scheduler.cancel();
        *state = AuthState::Anonymous;
        self.inner.persistor.clear()?;
        info!("session cleared");
        Ok(())
    }

    /// Pushes the absolute expiry out by a full lifetime from now and
    /// stamps activity, without asking the server.
    ///
    /// Returns `false` if there's no session, or if it already expired (in
    /// which case it is expired now, as in
    /// [`check_validity`](Self::check_validity)).
    ///
    /// # Errors
    /// Returns [`SessionError::Store`] if the record can't be written.
    pub fn extend_session(&self) -> Result<bool, SessionError> {
        let now = self.now();
        let state = self.lock_state();
        let Some(mut record) = self.inner.persistor.load() else {
            return Ok(false);
        };
        if let Err(reason) = record.validity(now, self.inner.policy.inactivity_limit) {
            self.expire_locked(state, reason, true);
            return Ok(false);
        }

        record.extend(now, self.inner.policy.lifetime(record.remember_me));
        self.inner.persistor.save(&record)?;
        drop(state);
        info!(
            session_id = %record.session_id,
            absolute_expiry = %record.absolute_expiry,
            "session extended"
        );
        Ok(true)
    }

    /// Stamps `lastActivity = now` on the stored session.
    ///
    /// Returns `false` when there's nothing to stamp, or when the session
    /// had already expired (it is expired now instead).
    ///
    /// # Errors
    /// Returns [`SessionError::Store`] if the record can't be written.
    pub fn record_activity(&self) -> Result<bool, SessionError> {
        self.record_activity_at(self.now())
    }

    fn record_activity_at(&self, at: DateTime<Utc>) -> Result<bool, SessionError> {
        let state = self.lock_state();
        if *state == AuthState::Anonymous {
            return Ok(false);
        }
        let Some(mut record) = self.inner.persistor.load() else {
            return Ok(false);
        };
        if let Err(reason) = record.validity(at, self.inner.policy.inactivity_limit) {
            self.expire_locked(state, reason, true);
            return Ok(false);
        }
        record.touch(at);
        self.inner.persistor.save(&record)?;
        debug!(session_id = %record.session_id, %at, "activity recorded");
        Ok(true)
    }

    /// Checks the stored session against both expiry clocks.
    ///
    /// Expires it (clear + [`SessionEvent::SessionExpired`]) when it's no
    /// longer valid, or when this context believed it was active but the
    /// record is gone. A stale record found while anonymous is cleared
    /// without an event. Returns whether a valid session remains.
    pub fn check_validity(&self) -> bool {
        let now = self.now();
        let state = self.lock_state();
        match self.inner.persistor.load() {
            Some(record) => match record.validity(now, self.inner.policy.inactivity_limit) {
                Ok(()) => true,
                Err(reason) => {
                    let announce = *state == AuthState::Active;
                    self.expire_locked(state, reason, announce);
                    false
                }
            },
            None if *state == AuthState::Active => {
                self.expire_locked(state, ExpiryReason::ClearedElsewhere, true);
                false
            }
            None => false,
        }
    }

    /// Rotates the tokens through the auth API.
    ///
    /// Single-flight: concurrent calls share one request. On success the
    /// record keeps its store, absolute expiry and last activity, and the
    /// refresh timer is re-armed for the new token. On failure the session
    /// is expired once with [`ExpiryReason::RefreshFailed`].
    ///
    /// # Errors
    /// - [`RefreshError::NoSession`] when there is nothing to refresh
    /// - whatever the auth API or the store reported otherwise
    pub async fn refresh_tokens(&self) -> Result<(), RefreshError> {
        let manager = self.clone();
        self.inner
            .coordinator
            .refresh_detailed(move || manager.run_refresh())
            .await
    }

    async fn run_refresh(self) -> Result<(), RefreshError> {
        let Some(record) = self.inner.persistor.load() else {
            return Err(RefreshError::NoSession);
        };
        let result = match self.inner.api.refresh(&record.refresh_token).await {
            Ok(response) => self.apply_refresh(&record.session_id, response),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) | Err(RefreshError::NoSession) => result,
            Err(e) => {
                warn!(session_id = %record.session_id, error = %e, "token refresh failed");
                self.expire(ExpiryReason::RefreshFailed);
                Err(e)
            }
        }
    }

    fn apply_refresh(&self, session_id: &str, response: RefreshResponse) -> Result<(), RefreshError> {
        let now = self.now();
        let access_token = {
            let _state = self.lock_state();
            // The user may have logged out, or in again, while the request
            // was in flight.
            let mut record = self
                .inner
                .persistor
                .load()
                .filter(|r| r.session_id == session_id)
                .ok_or(RefreshError::NoSession)?;
            record.rotate(response.token, response.refresh_token, now);
            self.inner.persistor.save(&record)?;
            record.access_token
        };
        self.arm(&access_token);
        info!(session_id, "tokens rotated");
        Ok(())
    }

    /// Reacts to [`SessionEvent::TokenRefreshNeeded`].
    ///
    /// An idle-too-long or expired session is expired rather than kept
    /// alive by the refresh. Returns whether a refreshed session remains.
    pub async fn handle_refresh_needed(&self) -> bool {
        if !self.check_validity() {
            return false;
        }
        self.refresh_tokens().await.is_ok()
    }

    /// Re-fetches the canonical user and overwrites the stored snapshot.
    ///
    /// Failure is logged and leaves the session untouched. Returns the
    /// fresh snapshot on success.
    pub async fn verify_user(&self) -> Option<UserSnapshot> {
        let record = self.inner.persistor.load()?;
        let user = match self.inner.api.me(&record.access_token).await {
            Ok(user) => user,
            Err(e) => {
                warn!(session_id = %record.session_id, error = %e, "user verification failed");
                return None;
            }
        };
        match self.replace_user(Some(&record.session_id), user.clone()) {
            Ok(true) => debug!(session_id = %record.session_id, "user snapshot verified"),
            Ok(false) => debug!("session changed during user verification"),
            Err(e) => warn!(error = %e, "failed to store verified user"),
        }
        Some(user)
    }

    /// Replaces the stored user snapshot (e.g. after a profile edit).
    /// Returns `false` when there's no session.
    ///
    /// # Errors
    /// Returns [`SessionError::Store`] if the record can't be written.
    pub fn update_user(&self, user: UserSnapshot) -> Result<bool, SessionError> {
        self.replace_user(None, user)
    }

    fn replace_user(&self, session_id: Option<&str>, user: UserSnapshot) -> Result<bool, SessionError> {
        let _state = self.lock_state();
        let Some(mut record) = self.inner.persistor.load() else {
            return Ok(false);
        };
        if session_id.is_some_and(|id| id != record.session_id) {
            return Ok(false);
        }
        record.user = user;
        self.inner.persistor.save(&record)?;
        Ok(true)
    }

    /// Reacts to the session being removed by another context.
    ///
    /// That context already cleared the shared tier, so only this context's
    /// ephemeral tier is cleared here. The timer stops, the state goes
    /// anonymous and the loss is announced.
    pub(crate) fn handle_cleared_elsewhere(&self) {
        let mut state = self.lock_state();
        self.inner.scheduler.cancel();
        if let Err(e) = self.inner.persistor.clear_ephemeral() {
            warn!(error = %e, "failed to clear ephemeral session");
        }
        *state = AuthState::Anonymous;
        drop(state);
        info!("session cleared in another context");
        self.emit(SessionEvent::SessionExpired {
            reason: ExpiryReason::ClearedElsewhere,
        });
    }

    // -- Queries ------------------------------------------------------------

    /// The stored record, without validity checks.
    pub fn current(&self) -> Option<SessionRecord> {
        self.inner.persistor.load()
    }

    pub fn state(&self) -> AuthState {
        *self.lock_state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == AuthState::Active
    }

    /// Time left before the absolute expiry, if there is a session.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        let now = self.now();
        self.current().map(|record| record.time_until_expiry(now))
    }

    /// The access token to attach to API requests.
    pub fn access_token(&self) -> Option<String> {
        self.inner.persistor.access_token()
    }

    /// Subscribes to session events. Only events sent after this call are
    /// delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.inner.policy
    }

    pub fn persistor(&self) -> &Persistor {
        &self.inner.persistor
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    pub(crate) fn shared_context(&self) -> Option<&StorageContext> {
        self.inner.shared.as_ref()
    }

    /// Whether the refresh timer is armed.
    pub fn refresh_scheduled(&self) -> bool {
        self.inner.scheduler.is_armed()
    }

    // -- Internals ----------------------------------------------------------

    fn arm(&self, access_token: &str) {
        if let ScheduleOutcome::Due = self.inner.scheduler.schedule(access_token) {
            debug!("access token already inside the refresh window");
        }
    }

    fn expire(&self, reason: ExpiryReason) {
        let state = self.lock_state();
        let had_session = *state == AuthState::Active || self.inner.persistor.load().is_some();
        self.expire_locked(state, reason, had_session);
    }

    /// Clears storage, stops the timer and goes anonymous. Announces the
    /// expiry when `announce` is set.
    fn expire_locked(&self, mut state: MutexGuard<'_, AuthState>, reason: ExpiryReason, announce: bool) {
        self.inner.scheduler.cancel();
        if let Err(e) = self.inner.persistor.clear() {
            warn!(error = %e, "failed to clear expired session");
        }
        *state = AuthState::Anonymous;
        drop(state);
        if announce {
            info!(%reason, "session expired");
            self.emit(SessionEvent::SessionExpired { reason });
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine; nobody is listening yet.
        let _ = self.inner.events.send(event);
    }
}

impl<A: AuthApi> ActivitySink for SessionManager<A> {
    fn record_activity(&self, at: DateTime<Utc>) {
        if let Err(e) = self.record_activity_at(at) {
            warn!(error = %e, "failed to record activity");
        }
    }
}

impl<A: AuthApi> std::fmt::Debug for SessionManager<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

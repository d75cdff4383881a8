//! Shared fixtures for the session integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use campus_refresh::{AuthApi, RefreshError, RefreshResponse};
use campus_session::{SessionManager, SessionManagerBuilder, SessionPolicy};
use campus_store::{MemoryStore, Role, UserSnapshot};
use campus_token::{Clock, ManualClock, SessionEvent, unsigned_token};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

pub const START_SECS: i64 = 1_700_000_000;

pub fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(START_SECS, 0).unwrap()
}

/// A token whose `exp` is `secs` after the clock's current time.
pub fn token_expiring_in(clock: &ManualClock, secs: i64, jti: usize) -> String {
    let exp = (clock.now() + TimeDelta::seconds(secs)).timestamp();
    unsigned_token(&json!({ "sub": "u-1", "exp": exp, "jti": jti }))
}

pub fn user() -> UserSnapshot {
    UserSnapshot::new("u-1", "Asha Rao", "asha@uni.example", Role::Student)
}

// =========================================================================
// Fake auth API
// =========================================================================

/// An in-memory auth server. Clones share counters and switches.
#[derive(Clone)]
pub struct FakeApi {
    clock: ManualClock,
    refresh_calls: Arc<AtomicUsize>,
    me_calls: Arc<AtomicUsize>,
    fail_refresh: Arc<AtomicBool>,
    rotate_refresh_token: Arc<AtomicBool>,
    me_user: Arc<Mutex<Option<UserSnapshot>>>,
    latency: Duration,
    issued_lifetime_secs: i64,
}

impl FakeApi {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            refresh_calls: Arc::default(),
            me_calls: Arc::default(),
            fail_refresh: Arc::default(),
            rotate_refresh_token: Arc::default(),
            me_user: Arc::default(),
            latency: Duration::ZERO,
            issued_lifetime_secs: 3600,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn me_calls(&self) -> usize {
        self.me_calls.load(Ordering::SeqCst)
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    pub fn rotate_refresh_token(&self, rotate: bool) {
        self.rotate_refresh_token.store(rotate, Ordering::SeqCst);
    }

    pub fn set_me(&self, user: Option<UserSnapshot>) {
        *self.me_user.lock().unwrap() = user;
    }
}

impl AuthApi for FakeApi {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RefreshError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(RefreshError::Rejected {
                operation: "token refresh",
                status: 401,
                detail: format!("refresh token {refresh_token} revoked"),
            });
        }
        let rotated = self
            .rotate_refresh_token
            .load(Ordering::SeqCst)
            .then(|| format!("refresh-{n}"));
        Ok(RefreshResponse {
            token: token_expiring_in(&self.clock, self.issued_lifetime_secs, n),
            refresh_token: rotated,
        })
    }

    async fn me(&self, _access_token: &str) -> Result<UserSnapshot, RefreshError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        let user = self.me_user.lock().unwrap().clone();
        user.ok_or_else(|| RefreshError::Transport("connection refused".into()))
    }
}

// =========================================================================
// Harness
// =========================================================================

pub struct Harness {
    pub manager: SessionManager<FakeApi>,
    pub api: FakeApi,
    pub clock: ManualClock,
    pub durable: Arc<MemoryStore>,
    pub ephemeral: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(SessionPolicy::default())
    }

    pub fn with_policy(policy: SessionPolicy) -> Self {
        Self::build(policy, |api| api)
    }

    pub fn build(policy: SessionPolicy, customize: impl FnOnce(FakeApi) -> FakeApi) -> Self {
        let clock = ManualClock::new(start());
        let api = customize(FakeApi::new(clock.clone()));
        let durable = Arc::new(MemoryStore::new());
        let ephemeral = Arc::new(MemoryStore::new());
        let manager = SessionManagerBuilder::new()
            .durable(Arc::clone(&durable))
            .ephemeral(Arc::clone(&ephemeral))
            .policy(policy)
            .clock(Arc::new(clock.clone()))
            .build(api.clone());
        Self {
            manager,
            api,
            clock,
            durable,
            ephemeral,
        }
    }

    /// Logs in with an access token expiring `token_secs` from now.
    pub fn login(&self, remember_me: bool, token_secs: i64) {
        self.manager
            .save_session(
                token_expiring_in(&self.clock, token_secs, 0),
                "refresh-0",
                user(),
                remember_me,
            )
            .unwrap();
    }
}

// =========================================================================
// Event helpers
// =========================================================================

/// Lets spawned tasks run without moving time.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

pub async fn elapse(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

/// Every event currently queued.
pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
        }
    }
}

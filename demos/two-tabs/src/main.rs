//! Two "tabs" sharing one durable store.
//!
//! Tab A logs in with "remember me", tab B picks the session up from the
//! shared file, A's token gets refreshed on schedule, then A logs out and
//! B follows.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use campus_session::prelude::*;
use campus_session::telemetry::init_tracing;
use campus_token::unsigned_token;
use serde_json::json;
use tracing::info;

// ---------------------------------------------------------------------------
// A stand-in auth server
// ---------------------------------------------------------------------------

/// Mints unsigned tokens that expire `token_lifetime` after issue.
struct LocalAuth {
    token_lifetime: Duration,
    issued: AtomicUsize,
}

impl LocalAuth {
    fn new(token_lifetime: Duration) -> Self {
        Self {
            token_lifetime,
            issued: AtomicUsize::new(0),
        }
    }

    fn mint(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::Relaxed);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let exp = (now + self.token_lifetime).as_secs();
        unsigned_token(&json!({ "sub": "u-42", "exp": exp, "jti": n }))
    }
}

impl AuthApi for LocalAuth {
    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshResponse, RefreshError> {
        Ok(RefreshResponse {
            token: self.mint(),
            refresh_token: None,
        })
    }

    async fn me(&self, _access_token: &str) -> Result<UserSnapshot, RefreshError> {
        Ok(demo_user())
    }
}

fn demo_user() -> UserSnapshot {
    UserSnapshot::new("u-42", "Ravi Menon", "ravi@uni.example", Role::Faculty)
}

// ---------------------------------------------------------------------------
// Walkthrough
// ---------------------------------------------------------------------------

/// Tokens that become refresh-due two seconds after issue.
fn short_token_lifetime(policy: &SessionPolicy) -> Duration {
    policy.refresh_lead_time + Duration::from_secs(2)
}

fn open_tab(shared: &SharedStorage) -> SessionManager<LocalAuth> {
    let policy = SessionPolicy::default();
    let auth = LocalAuth::new(short_token_lifetime(&policy));
    SessionManagerBuilder::new()
        .shared_durable(shared.context())
        .ephemeral(MemoryStore::new())
        .policy(policy)
        .build(auth)
}

async fn run(dir: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let shared = SharedStorage::new(FileStore::open(dir.join("durable.json"))?);
    let tab_a = open_tab(&shared);
    let tab_b = open_tab(&shared);
    let runtime_a = tab_a.start();
    let runtime_b = tab_b.start();

    let login_token = LocalAuth::new(short_token_lifetime(tab_a.policy())).mint();
    let record = tab_a.save_session(login_token, "refresh-initial", demo_user(), true)?;
    info!(session_id = %record.session_id, "tab A logged in");

    match tab_b.restore_session() {
        Some(restored) => info!(user = %restored.user.name, "tab B restored the shared session"),
        None => return Err("tab B found no session".into()),
    }

    let before = tab_a.access_token();
    tokio::time::sleep(Duration::from_secs(3)).await;
    info!(
        rotated = tab_a.access_token() != before,
        "scheduled refresh ran in the background"
    );

    runtime_a.activity().interaction(Interaction::KeyPress);
    runtime_a.activity().visibility_changed(Visibility::Hidden);
    runtime_a.activity().visibility_changed(Visibility::Visible);

    let mut b_events = tab_b.subscribe();
    tab_a.clear_session()?;
    info!("tab A logged out");

    let event = tokio::time::timeout(Duration::from_secs(2), b_events.recv()).await??;
    info!(?event, state = ?tab_b.state(), "tab B followed");

    runtime_a.shutdown();
    runtime_b.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info,campus_session=debug");
    let dir = tempfile::tempdir()?;
    run(dir.path()).await
}

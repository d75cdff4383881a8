//! Integration tests for the debounced activity tracker.
//!
//! Tokio time is paused; the tracker's debounce runs on Tokio time while
//! its stamps read a `ManualClock`, so the stamped instants are fixed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use campus_timer::{ActivityConfig, ActivityHandle, ActivitySink, ActivityTracker, Interaction, Visibility};
use campus_token::ManualClock;
use chrono::{DateTime, TimeDelta, Utc};

// =========================================================================
// Helpers
// =========================================================================

#[derive(Default)]
struct RecordingSink {
    stamps: Mutex<Vec<DateTime<Utc>>>,
}

impl RecordingSink {
    fn stamps(&self) -> Vec<DateTime<Utc>> {
        self.stamps.lock().unwrap().clone()
    }
}

impl ActivitySink for RecordingSink {
    fn record_activity(&self, at: DateTime<Utc>) {
        self.stamps.lock().unwrap().push(at);
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
    handle: ActivityHandle,
}

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn spawn_tracker() -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let sink = Arc::new(RecordingSink::default());
    let handle = ActivityTracker::spawn(ActivityConfig::default(), clock.clone(), sink.clone());
    Harness { clock, sink, handle }
}

async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

async fn elapse(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
    settle().await;
}

// =========================================================================
// Debounce
// =========================================================================

#[test]
fn test_default_debounce_is_thirty_seconds() {
    assert_eq!(ActivityConfig::default().debounce, Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_interactions_writes_once_after_quiet_period() {
    let h = spawn_tracker();

    for kind in [
        Interaction::PointerMove,
        Interaction::KeyPress,
        Interaction::Scroll,
        Interaction::Touch,
        Interaction::Click,
    ] {
        assert!(h.handle.interaction(kind));
        elapse(5).await;
    }
    assert!(h.sink.stamps().is_empty(), "still inside the debounce window");

    elapse(30).await;
    assert_eq!(h.sink.stamps().len(), 1);

    elapse(300).await;
    assert_eq!(h.sink.stamps().len(), 1, "no further writes without interaction");
}

#[tokio::test(start_paused = true)]
async fn test_each_interaction_rearms_the_deadline() {
    let h = spawn_tracker();

    h.handle.interaction(Interaction::KeyPress);
    elapse(29).await;
    h.handle.interaction(Interaction::KeyPress);
    elapse(29).await;
    assert!(h.sink.stamps().is_empty());

    elapse(2).await;
    assert_eq!(h.sink.stamps().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_separate_bursts_write_separately() {
    let h = spawn_tracker();

    h.handle.interaction(Interaction::Click);
    elapse(31).await;
    h.clock.advance(TimeDelta::minutes(10));
    h.handle.interaction(Interaction::Click);
    elapse(31).await;

    let stamps = h.sink.stamps();
    assert_eq!(stamps, vec![start(), start() + TimeDelta::minutes(10)]);
}

#[tokio::test(start_paused = true)]
async fn test_custom_debounce() {
    let clock = Arc::new(ManualClock::new(start()));
    let sink = Arc::new(RecordingSink::default());
    let config = ActivityConfig {
        debounce: Duration::from_secs(5),
    };
    let handle = ActivityTracker::spawn(config, clock, sink.clone());

    handle.interaction(Interaction::Scroll);
    elapse(6).await;
    assert_eq!(sink.stamps().len(), 1);
}

// =========================================================================
// Visibility
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_hidden_to_visible_stamps_immediately() {
    let h = spawn_tracker();

    h.handle.visibility_changed(Visibility::Hidden);
    settle().await;
    assert!(h.sink.stamps().is_empty(), "hiding is not activity");

    h.clock.advance(TimeDelta::hours(2));
    h.handle.visibility_changed(Visibility::Visible);
    settle().await;

    assert_eq!(h.sink.stamps(), vec![start() + TimeDelta::hours(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_visible_to_visible_does_not_stamp() {
    let h = spawn_tracker();

    h.handle.visibility_changed(Visibility::Visible);
    h.handle.visibility_changed(Visibility::Visible);
    settle().await;

    assert!(h.sink.stamps().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_visibility_stamp_does_not_cancel_pending_debounce() {
    let h = spawn_tracker();

    h.handle.interaction(Interaction::PointerMove);
    h.handle.visibility_changed(Visibility::Hidden);
    h.handle.visibility_changed(Visibility::Visible);
    settle().await;
    assert_eq!(h.sink.stamps().len(), 1);

    elapse(31).await;
    assert_eq!(h.sink.stamps().len(), 2);
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_drops_pending_stamp_and_stops() {
    let h = spawn_tracker();

    h.handle.interaction(Interaction::KeyPress);
    assert!(h.handle.shutdown());
    elapse(60).await;

    assert!(h.sink.stamps().is_empty());
    assert!(!h.handle.is_running());
    assert!(!h.handle.interaction(Interaction::KeyPress));
}

#[tokio::test(start_paused = true)]
async fn test_tracker_stops_when_all_handles_dropped() {
    let h = spawn_tracker();
    let sink = h.sink.clone();

    h.handle.interaction(Interaction::KeyPress);
    drop(h);
    elapse(60).await;

    // The command was queued before the channel closed, so the actor saw
    // the interaction, then `None`, and exited without stamping.
    assert!(sink.stamps().is_empty());
    assert_eq!(Arc::strong_count(&sink), 1);
}

//! Check loop behaviour observed through the store and the event bus
//!
//! All tests run on a paused clock, so `advance` jumps straight to the next
//! scheduled check.

use pretty_assertions::assert_eq;
use uptime_monitor::{BusEvent, MonitorStatus, StorageBackend};

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_single_failure_produces_down_then_up() {
    let harness = Harness::new(
        [Step::Value(120), Step::Value(120), Step::Value(120), Step::Value(-1), Step::Value(120)],
        120,
    );
    harness.manager.upsert_monitor(scripted_monitor("m1", "api", 20)).await.unwrap();

    // ticks at 0s, 20s, 40s
    advance(41).await;
    assert_eq!(harness.event_kinds("m1").await, Vec::<String>::new());

    advance(20).await;
    assert_eq!(harness.event_kinds("m1").await, vec!["DOWN"]);

    advance(20).await;
    assert_eq!(harness.event_kinds("m1").await, vec!["DOWN", "UP"]);
    assert_eq!(harness.sample_values("m1").await, vec![120, 120, 120, -1, 120]);

    harness.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_probe_errors_and_panics_are_failures() {
    let harness = Harness::new([Step::Value(50), Step::Fail, Step::Panic, Step::Value(50)], 50);
    harness.manager.upsert_monitor(scripted_monitor("m1", "api", 20)).await.unwrap();

    advance(61).await;

    assert_eq!(harness.sample_values("m1").await, vec![50, -1, -1, 50]);
    assert_eq!(harness.event_kinds("m1").await, vec!["DOWN", "UP"]);
    assert!(harness.manager.is_running("m1").await, "loop must survive a panicking probe");

    harness.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_hanging_probe_is_cut_off_at_deadline() {
    let harness = Harness::new([Step::Hang], 30);
    harness.manager.upsert_monitor(scripted_monitor("m1", "api", 20)).await.unwrap();

    // deadline is 10s, next check 20s after that
    advance(15).await;
    assert_eq!(harness.sample_values("m1").await, vec![-1]);
    assert_eq!(harness.event_kinds("m1").await, vec!["DOWN"]);

    advance(20).await;
    assert_eq!(harness.sample_values("m1").await, vec![-1, 30]);
    assert_eq!(harness.event_kinds("m1").await, vec!["DOWN", "UP"]);

    harness.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_zero_values_never_transition() {
    let harness = Harness::new(
        [Step::Value(0), Step::Value(-1), Step::Value(0), Step::Value(0), Step::Value(5)],
        5,
    );
    harness.manager.upsert_monitor(scripted_monitor("m1", "api", 20)).await.unwrap();

    advance(1).await;
    assert_eq!(harness.event_kinds("m1").await, Vec::<String>::new());

    advance(80).await;
    assert_eq!(harness.sample_values("m1").await, vec![0, -1, 0, 0, 5]);
    assert_eq!(harness.event_kinds("m1").await, vec!["DOWN", "UP"]);

    harness.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_samples_after_stop() {
    let harness = Harness::new([], 10);
    harness.manager.upsert_monitor(scripted_monitor("m1", "api", 20)).await.unwrap();

    advance(1).await;
    harness.manager.deactivate_monitor("m1").await.unwrap();
    let calls = harness.probe.calls();

    advance(100).await;

    assert_eq!(harness.sample_values("m1").await, vec![10]);
    assert_eq!(harness.probe.calls(), calls);
    assert!(!harness.manager.is_running("m1").await);
}

#[tokio::test(start_paused = true)]
async fn test_failed_event_write_still_updates_status() {
    let harness = Harness::new([Step::Value(-1)], 10);
    let mut subscription = harness.bus.subscribe(WORKSPACE);
    harness.store.fail_events(true);

    harness.manager.upsert_monitor(scripted_monitor("m1", "api", 20)).await.unwrap();
    advance(1).await;

    assert_eq!(harness.event_kinds("m1").await, Vec::<String>::new());
    assert_eq!(harness.sample_values("m1").await, vec![-1]);
    assert_eq!(harness.manager.status("m1").await, Some(MonitorStatus::Down));

    let first = subscription.try_recv().unwrap();
    assert!(matches!(first, BusEvent::StatusChanged { ref event, .. } if event.kind == MonitorStatus::Down));

    harness.store.fail_events(false);
    advance(20).await;

    assert_eq!(harness.event_kinds("m1").await, vec!["UP"]);
    assert_eq!(harness.manager.status("m1").await, Some(MonitorStatus::Up));

    harness.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_bus_receives_transition_before_sample() {
    let harness = Harness::new([Step::Value(-1)], -1);
    let mut subscription = harness.bus.subscribe(WORKSPACE);
    let mut other = harness.bus.subscribe("another-workspace");

    harness.manager.upsert_monitor(scripted_monitor("m1", "api", 20)).await.unwrap();
    advance(1).await;

    match subscription.try_recv() {
        Some(BusEvent::StatusChanged { workspace_id, event }) => {
            assert_eq!(workspace_id, WORKSPACE);
            assert_eq!(event.monitor_id, "m1");
            assert_eq!(event.message, "Monitor [api] has been down");
        }
        other => panic!("expected status change, got {other:?}"),
    }

    match subscription.try_recv() {
        Some(BusEvent::NewSample { sample, .. }) => assert_eq!(sample.value, -1),
        other => panic!("expected sample, got {other:?}"),
    }

    assert!(subscription.try_recv().is_none());
    assert!(other.try_recv().is_none());

    harness.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_check_now_runs_a_cycle() {
    let harness = Harness::new([Step::Value(-1)], 15);
    harness.manager.upsert_monitor(scripted_monitor("m1", "api", 20)).await.unwrap();
    advance(1).await;

    let outcome = harness.manager.check_now("m1").await.unwrap();
    assert_eq!(outcome, uptime_monitor::Outcome::Up(15));
    assert_eq!(harness.event_kinds("m1").await, vec!["DOWN", "UP"]);

    let samples = harness.store.query_latest_samples("m1", 10).await.unwrap();
    assert_eq!(samples.len(), 2);

    harness.manager.shutdown().await;
}

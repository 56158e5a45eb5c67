//! Integration tests for storage persistence
//!
//! These tests verify that:
//! - Monitors, samples and events survive a process restart on SQLite
//! - A restarted engine resumes from the last recorded status
//! - Notification order is preserved

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::tempdir;
use uptime_monitor::event_bus::WorkspaceSubscription;
use uptime_monitor::notifications::{ChannelRegistry, NotificationDispatcher};
use uptime_monitor::probes::ProbeRegistry;
use uptime_monitor::storage::sqlite::SqliteBackend;
use uptime_monitor::storage::MonitorSummary;
use uptime_monitor::{BusEvent, EventBus, MonitorManager, MonitorStatus, RunnerContext, StorageBackend};

use crate::helpers::*;

fn sqlite_manager(store: Arc<dyn StorageBackend>, probe: Arc<ScriptedProbe>, channel: Arc<RecordingChannel>) -> MonitorManager {
    let mut probes = ProbeRegistry::new();
    probes.register(probe);

    let mut channels = ChannelRegistry::new();
    channels.register(channel);

    let ctx = RunnerContext::new(store, NotificationDispatcher::new(Arc::new(channels)), EventBus::default());
    MonitorManager::new(ctx, Arc::new(probes))
}

/// Wait for the next sample published on the bus
async fn next_sample(subscription: &mut WorkspaceSubscription) {
    let wait = async {
        while let Some(event) = subscription.recv().await {
            if let BusEvent::NewSample { .. } = event {
                return;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("no sample published");
}

#[tokio::test]
async fn test_status_survives_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("uptime.db");
    let channel = Arc::new(RecordingChannel::default());

    {
        let store: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let manager = sqlite_manager(store.clone(), Arc::new(ScriptedProbe::new([], -1)), channel.clone());
        let mut subscription = manager.event_bus().subscribe(WORKSPACE);

        manager.upsert_notification(recording_notification("n2", false)).await.unwrap();
        manager.upsert_notification(recording_notification("n1", false)).await.unwrap();

        let mut request = scripted_monitor("m1", "api", 3600);
        request.notification_ids = vec!["n2".to_string(), "n1".to_string()];
        manager.upsert_monitor(request).await.unwrap();

        next_sample(&mut subscription).await;
        manager.shutdown().await;
        store.close().await.unwrap();
    }

    assert_eq!(channel.attempts(), vec!["n1", "n2"]);

    let store: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let monitor = store.get_monitor("m1").await.unwrap().unwrap();
    assert_eq!(monitor.notification_ids, vec!["n2", "n1"]);
    assert_eq!(monitor.interval_secs, 3600);

    let manager = sqlite_manager(store.clone(), Arc::new(ScriptedProbe::new([], -1)), channel.clone());
    let mut subscription = manager.event_bus().subscribe(WORKSPACE);

    assert_eq!(manager.bootstrap().await.unwrap(), 1);
    assert_eq!(manager.status("m1").await, Some(MonitorStatus::Down));
    next_sample(&mut subscription).await;
    manager.shutdown().await;

    let events = store.query_recent_events(Some("m1"), 10).await.unwrap();
    assert_eq!(events.len(), 1, "restart must not repeat the DOWN transition");
    assert_eq!(events[0].message, "Monitor [api] has been down");

    let samples = store.query_latest_samples("m1", 10).await.unwrap();
    assert_eq!(samples.iter().map(|s| s.value).collect::<Vec<_>>(), vec![-1, -1]);
    assert_eq!(channel.attempts().len(), 2);

    let summary = MonitorSummary::collect(store.as_ref(), "m1", chrono::Utc::now()).await.unwrap();
    assert_eq!(summary.recent_offline, 2);
    assert_eq!(summary.recent_online, 0);

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_delete_cascades_on_sqlite() {
    let temp_dir = tempdir().unwrap();
    let store: Arc<dyn StorageBackend> =
        Arc::new(SqliteBackend::new(temp_dir.path().join("uptime.db")).await.unwrap());
    let manager = sqlite_manager(
        store.clone(),
        Arc::new(ScriptedProbe::new([], -1)),
        Arc::new(RecordingChannel::default()),
    );
    let mut subscription = manager.event_bus().subscribe(WORKSPACE);

    manager.upsert_monitor(scripted_monitor("m1", "api", 3600)).await.unwrap();
    next_sample(&mut subscription).await;

    assert!(manager.delete_monitor("m1").await.unwrap());
    assert!(store.get_monitor("m1").await.unwrap().is_none());
    assert!(store.query_latest_samples("m1", 10).await.unwrap().is_empty());
    assert!(store.latest_event("m1").await.unwrap().is_none());

    store.close().await.unwrap();
}

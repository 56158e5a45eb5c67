//! Transition notifications across several channels

use std::sync::Arc;

use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::json;
use uptime_monitor::MonitorStatus;
use uptime_monitor::notifications::{ChannelRegistry, NotificationDispatcher, status_message};
use uptime_monitor::storage::NotificationRecord;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn notification(id: &str, channel_type: &str, payload: serde_json::Value) -> NotificationRecord {
    NotificationRecord {
        id: id.to_string(),
        name: id.to_string(),
        channel_type: channel_type.to_string(),
        payload,
    }
}

#[tokio::test(start_paused = true)]
async fn test_failing_channel_does_not_stop_the_others() {
    let harness = Harness::new([Step::Value(-1)], 10);
    for (id, fail) in [("n1", false), ("n2", true), ("n3", false)] {
        harness.manager.upsert_notification(recording_notification(id, fail)).await.unwrap();
    }

    let mut request = scripted_monitor("m1", "checkout", 20);
    request.notification_ids = vec!["n1".to_string(), "n2".to_string(), "n3".to_string()];
    harness.manager.upsert_monitor(request).await.unwrap();

    advance(1).await;

    assert_eq!(harness.channel.attempts(), vec!["n1", "n2", "n3"]);
    assert_eq!(
        harness.channel.delivered(),
        vec![
            ("n1".to_string(), "[checkout] 🔴 Down".to_string()),
            ("n3".to_string(), "[checkout] 🔴 Down".to_string()),
        ]
    );
    assert_eq!(harness.event_kinds("m1").await, vec!["DOWN"]);

    advance(20).await;

    assert_eq!(harness.event_kinds("m1").await, vec!["DOWN", "UP"]);
    assert_eq!(harness.channel.delivered().len(), 4);
    assert!(harness.manager.is_running("m1").await);

    harness.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_notifications_without_transition() {
    let harness = Harness::new([], 10);
    harness.manager.upsert_notification(recording_notification("n1", false)).await.unwrap();

    let mut request = scripted_monitor("m1", "api", 20);
    request.notification_ids = vec!["n1".to_string()];
    harness.manager.upsert_monitor(request).await.unwrap();

    advance(61).await;

    assert_eq!(harness.sample_values("m1").await, vec![10, 10, 10, 10]);
    assert!(harness.channel.attempts().is_empty());

    harness.manager.shutdown().await;
}

#[tokio::test]
async fn test_builtin_channels_over_http() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/botsecret/sendMessage"))
        .and(body_partial_json(json!({ "chat_id": "42", "parse_mode": "MarkdownV2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/discord"))
        .and(body_partial_json(json!({ "embeds": [{ "title": "[shop] 🔴 Down", "color": 15158332 }] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({ "title": "[shop] 🔴 Down", "status": "DOWN" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let base = mock_server.uri();
    let notifications = vec![
        notification(
            "telegram",
            "telegram",
            json!({ "bot_token": "secret", "chat_id": "42", "api_base": base }),
        ),
        notification("broken", "webhook", json!({ "url": format!("{base}/broken") })),
        notification("discord", "discord", json!({ "url": format!("{base}/discord") })),
        notification("webhook", "webhook", json!({ "url": format!("{base}/hook") })),
    ];

    let dispatcher = NotificationDispatcher::new(Arc::new(ChannelRegistry::with_defaults()));
    let report = dispatcher
        .notify(&notifications, &status_message("shop", MonitorStatus::Down, Utc::now()))
        .await;

    assert_eq!(report.delivered, vec!["telegram", "discord", "webhook"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken");
}

use super::*;
use chrono::Utc;

fn heartbeat() -> ServerMessage {
    ServerMessage::heartbeat()
}

#[tokio::test]
async fn test_subscribe_delivers_initial_snapshot_first() {
    let hub = BroadcastHub::new(8);

    let mut sub = hub.subscribe(ServerMessage::initial_data(vec![]));
    hub.publish(heartbeat());

    let first = sub.rx.recv().await.unwrap();
    assert!(matches!(first, ServerMessage::InitialData { .. }));

    let second = sub.rx.recv().await.unwrap();
    assert!(matches!(second, ServerMessage::Heartbeat { .. }));
}

#[tokio::test]
async fn test_publish_reaches_all_sinks() {
    let hub = BroadcastHub::new(8);

    let mut a = hub.subscribe(ServerMessage::initial_data(vec![]));
    let mut b = hub.subscribe(ServerMessage::initial_data(vec![]));
    assert_eq!(hub.subscriber_count(), 2);

    assert_eq!(hub.publish(heartbeat()), 2);

    a.rx.recv().await.unwrap(); // initial
    b.rx.recv().await.unwrap();
    assert!(matches!(
        a.rx.recv().await.unwrap(),
        ServerMessage::Heartbeat { .. }
    ));
    assert!(matches!(
        b.rx.recv().await.unwrap(),
        ServerMessage::Heartbeat { .. }
    ));
}

#[tokio::test]
async fn test_failing_sink_is_dropped_during_publish() {
    let hub = BroadcastHub::new(8);

    let _a = hub.subscribe(ServerMessage::initial_data(vec![]));
    let _b = hub.subscribe(ServerMessage::initial_data(vec![]));
    let dead = hub.subscribe(ServerMessage::initial_data(vec![]));
    assert_eq!(hub.subscriber_count(), 3);

    // Dropping the receiver closes the channel; the next publish prunes it
    drop(dead.rx);
    assert_eq!(hub.publish(heartbeat()), 2);
    assert_eq!(hub.subscriber_count(), 2);

    // The failed sink receives no further publishes
    assert_eq!(hub.publish(heartbeat()), 2);
}

#[tokio::test]
async fn test_slow_sink_is_dropped_not_awaited() {
    let hub = BroadcastHub::new(1);

    // Initial snapshot fills the single-slot buffer; the sink never drains it
    let _slow = hub.subscribe(ServerMessage::initial_data(vec![]));
    let mut fast = hub.subscribe(ServerMessage::initial_data(vec![]));
    fast.rx.recv().await.unwrap();

    assert_eq!(hub.publish(heartbeat()), 1);
    assert_eq!(hub.subscriber_count(), 1);
    assert!(matches!(
        fast.rx.recv().await.unwrap(),
        ServerMessage::Heartbeat { .. }
    ));
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent() {
    let hub = BroadcastHub::new(8);
    let sub = hub.subscribe(ServerMessage::initial_data(vec![]));

    hub.unsubscribe(sub.id);
    hub.unsubscribe(sub.id);
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test]
async fn test_per_sink_fifo_ordering() {
    let hub = BroadcastHub::new(8);
    let mut sub = hub.subscribe(ServerMessage::initial_data(vec![]));
    sub.rx.recv().await.unwrap();

    hub.publish(ServerMessage::BotNameUpdate {
        bot_id: "rover-1".to_string(),
        name: "first".to_string(),
    });
    hub.publish(ServerMessage::BotNameUpdate {
        bot_id: "rover-1".to_string(),
        name: "second".to_string(),
    });

    match sub.rx.recv().await.unwrap() {
        ServerMessage::BotNameUpdate { name, .. } => assert_eq!(name, "first"),
        other => panic!("unexpected message: {:?}", other),
    }
    match sub.rx.recv().await.unwrap() {
        ServerMessage::BotNameUpdate { name, .. } => assert_eq!(name, "second"),
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_wire_type_tags() {
    let cases = vec![
        (ServerMessage::initial_data(vec![]), "initial_data"),
        (ServerMessage::heartbeat(), "heartbeat"),
        (
            ServerMessage::BotNameUpdate {
                bot_id: "rover-1".to_string(),
                name: "Wheelie".to_string(),
            },
            "bot_name_update",
        ),
        (
            ServerMessage::BotsCleanedUp { removed_count: 2 },
            "bots_cleaned_up",
        ),
        (
            ServerMessage::esp_now_activity(crate::report::EspNowReport {
                sender_mac: "AA".to_string(),
                receiver_mac: "BB".to_string(),
                message_type: "ping".to_string(),
                payload: serde_json::json!({}),
                rssi: None,
            }),
            "esp_now_activity",
        ),
    ];

    for (message, expected) in cases {
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], expected);
    }
}

#[test]
fn test_heartbeat_carries_timestamp() {
    let before = Utc::now();
    let value = serde_json::to_value(ServerMessage::heartbeat()).unwrap();
    let ts: chrono::DateTime<Utc> =
        serde_json::from_value(value["timestamp"].clone()).unwrap();
    assert!(ts >= before);
}

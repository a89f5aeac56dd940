//! Reconnection integration tests
//!
//! Tests for subscription table clearing, resubscription on a fresh session
//! and the two authentication-failure policies.

mod common;

use common::{
    event_channel, eventually, next_event, state_event, wait_for_state, MockHassServer, TEST_TOKEN,
};
use hassmon_client::{ConnectionState, FixedDelay, MonitorBuilder, NoReconnect};
use hassmon_core::SemanticType;
use std::time::Duration;

#[tokio::test]
async fn test_table_cleared_when_server_closes() {
    let mut server = MockHassServer::new().await;
    let (callback, _events) = event_channel();
    let mut monitor = MonitorBuilder::new(server.endpoint(), TEST_TOKEN)
        .entity("sensor.a", SemanticType::Numeric)
        .reconnect_delay(Duration::from_secs(3600))
        .on_state_change(callback)
        .build()
        .unwrap();
    let mut state = monitor.watch_connection_state();
    monitor.start().unwrap();

    server.wait_for_handshake(1).await;
    wait_for_state(&mut state, ConnectionState::Live).await;
    assert_eq!(monitor.subscriptions().await.len(), 1);

    server.close_connections();
    wait_for_state(&mut state, ConnectionState::Disconnected).await;

    assert!(monitor.subscriptions().await.is_empty());
    // Still waiting out the reconnect delay
    assert!(monitor.is_running());

    monitor.stop().await;
    assert!(!monitor.is_running());
    server.shutdown().await;
}

#[tokio::test]
async fn test_resubscribes_with_fresh_ids_after_reconnect() {
    let mut server = MockHassServer::new().await;
    let (callback, mut events) = event_channel();
    let mut monitor = MonitorBuilder::new(server.endpoint(), TEST_TOKEN)
        .entity("sensor.a", SemanticType::Numeric)
        .entity("sensor.b", SemanticType::String)
        .reconnect_delay(Duration::from_millis(50))
        .on_state_change(callback)
        .build()
        .unwrap();
    monitor.start().unwrap();

    let first = server.wait_for_handshake(2).await;
    server.close_connections();

    let second = server.wait_for_handshake(2).await;
    assert_eq!(first, second);
    assert_eq!(second[0], (1, "sensor.a".to_string()));
    assert_eq!(server.connection_count(), 2);

    server.send(state_event(2, "sensor.b", "hello", "bye"));
    let event = next_event(&mut events).await;
    assert_eq!(event.entity_id, "sensor.b");
    assert_eq!(event.subscription_id, 2);

    monitor.stop().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_auth_failure_is_retried_by_default() {
    let server = MockHassServer::with_token("the-right-token").await;
    let (callback, _events) = event_channel();
    let mut monitor = MonitorBuilder::new(server.endpoint(), "a-wrong-token")
        .entity("sensor.a", SemanticType::Numeric)
        .reconnect_delay(Duration::from_millis(50))
        .on_state_change(callback)
        .build()
        .unwrap();
    monitor.start().unwrap();

    assert!(eventually(|| server.connection_count() >= 3).await);
    assert!(monitor.is_running());
    assert!(monitor.subscriptions().await.is_empty());

    monitor.stop().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_stop_on_auth_failure_ends_monitoring() {
    let mut server = MockHassServer::with_token("the-right-token").await;
    let (callback, _events) = event_channel();
    let mut monitor = MonitorBuilder::new(server.endpoint(), "a-wrong-token")
        .entity("sensor.a", SemanticType::Numeric)
        .reconnect_delay(Duration::from_millis(50))
        .stop_on_auth_failure(true)
        .on_state_change(callback)
        .build()
        .unwrap();
    monitor.start().unwrap();

    let auth = server.wait_for_frame().await.unwrap();
    assert_eq!(auth["access_token"], "a-wrong-token");

    assert!(eventually(|| !monitor.is_running()).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connection_count(), 1);
    assert_eq!(monitor.connection_state(), ConnectionState::Disconnected);

    monitor.stop().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_no_reconnect_strategy_runs_one_session() {
    let mut server = MockHassServer::new().await;
    let (callback, _events) = event_channel();
    let mut monitor = MonitorBuilder::new(server.endpoint(), TEST_TOKEN)
        .entity("sensor.a", SemanticType::Numeric)
        .reconnect(Box::new(NoReconnect))
        .on_state_change(callback)
        .build()
        .unwrap();
    monitor.start().unwrap();

    server.wait_for_handshake(1).await;
    server.close_connections();

    assert!(eventually(|| !monitor.is_running()).await);
    assert_eq!(server.connection_count(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_attempts_reset_after_reaching_live() {
    let mut server = MockHassServer::new().await;
    let (callback, _events) = event_channel();
    // One retry allowed between live sessions
    let mut monitor = MonitorBuilder::new(server.endpoint(), TEST_TOKEN)
        .entity("sensor.a", SemanticType::Numeric)
        .reconnect(Box::new(
            FixedDelay::new(Duration::from_millis(20)).with_max_attempts(1),
        ))
        .on_state_change(callback)
        .build()
        .unwrap();
    monitor.start().unwrap();

    for _ in 0..3 {
        server.wait_for_handshake(1).await;
        server.close_connections();
    }

    server.wait_for_handshake(1).await;
    assert!(monitor.is_running());
    assert_eq!(server.connection_count(), 4);

    monitor.stop().await;
    server.shutdown().await;
}

//! Common test utilities for hassmon-client integration tests
//!
//! `MockHassServer` speaks just enough of the Home Assistant WebSocket API to
//! drive a monitor: it sends `auth_required`, checks the token, acknowledges
//! every `subscribe_trigger` and lets the test push arbitrary frames or drop
//! every open connection.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use hassmon_client::{CallbackResult, ConnectionState};
use hassmon_core::StateChangeEvent;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const TEST_TOKEN: &str = "test-token";

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Control {
    Send(String),
    Close,
}

/// Mock Home Assistant WebSocket endpoint
pub struct MockHassServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    control_tx: broadcast::Sender<Control>,
    frame_rx: mpsc::UnboundedReceiver<Value>,
    connections: Arc<AtomicUsize>,
}

impl MockHassServer {
    /// Start a server that accepts [`TEST_TOKEN`]
    pub async fn new() -> Self {
        Self::with_token(TEST_TOKEN).await
    }

    /// Start a server that accepts only `token`
    pub async fn with_token(token: &str) -> Self {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (control_tx, _) = broadcast::channel::<Control>(64);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Value>();
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_control = control_tx.clone();
        let accept_connections = Arc::clone(&connections);
        let token = token.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let control_rx = accept_control.subscribe();
                        let frame_tx = frame_tx.clone();
                        let token = token.clone();
                        accept_connections.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(serve_connection(stream, token, control_rx, frame_tx));
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            control_tx,
            frame_rx,
            connections,
        }
    }

    /// Bare `host:port`, as a user would configure it
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    pub fn url(&self) -> String {
        format!("ws://{}/api/websocket", self.addr)
    }

    /// Connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Push a text frame to every open connection
    pub fn send(&self, text: impl Into<String>) {
        let _ = self.control_tx.send(Control::Send(text.into()));
    }

    /// Close every open connection from the server side
    pub fn close_connections(&self) {
        let _ = self.control_tx.send(Control::Close);
    }

    /// Next frame received from a client, decoded as JSON
    pub async fn wait_for_frame(&mut self) -> Option<Value> {
        tokio::time::timeout(WAIT, self.frame_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for the `auth` frame and `count` subscriptions of one session
    ///
    /// Returns the `(id, entity_id)` pairs in the order they were sent.
    pub async fn wait_for_handshake(&mut self, count: usize) -> Vec<(u64, String)> {
        let auth = self.wait_for_frame().await.expect("auth frame");
        assert_eq!(auth["type"], "auth");

        let mut subscriptions = Vec::with_capacity(count);
        for _ in 0..count {
            let frame = self.wait_for_frame().await.expect("subscribe frame");
            assert_eq!(frame["type"], "subscribe_trigger");
            assert_eq!(frame["trigger"]["platform"], "state");
            subscriptions.push((
                frame["id"].as_u64().expect("numeric id"),
                frame["trigger"]["entity_id"].as_str().unwrap_or_default().to_string(),
            ));
        }
        subscriptions
    }

    /// Shutdown the mock server; open connections are closed first
    pub async fn shutdown(self) {
        self.close_connections();
        let _ = self.shutdown_tx.send(()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    token: String,
    mut control_rx: broadcast::Receiver<Control>,
    frame_tx: mpsc::UnboundedSender<Value>,
) {
    let Ok(ws_stream) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws_stream.split();

    if write.send(Message::Text(auth_required())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            message = read.next() => {
                let Some(Ok(message)) = message else { break };
                let Message::Text(text) = message else { continue };
                let Ok(frame) = serde_json::from_str::<Value>(&text) else { continue };
                let _ = frame_tx.send(frame.clone());

                match frame["type"].as_str() {
                    Some("auth") => {
                        if frame["access_token"] == token.as_str() {
                            let _ = write.send(Message::Text(auth_ok())).await;
                        } else {
                            let _ = write.send(Message::Text(auth_invalid())).await;
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Some("subscribe_trigger") => {
                        let id = frame["id"].as_u64().unwrap_or_default();
                        let _ = write.send(Message::Text(result_ok(id))).await;
                    }
                    _ => {}
                }
            }
            control = control_rx.recv() => match control {
                Ok(Control::Send(text)) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Control::Close) | Err(broadcast::error::RecvError::Closed) => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            }
        }
    }
}

/// Route monitor logs to the test output; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wait until the monitor reports `state`
pub async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
    tokio::time::timeout(WAIT, rx.wait_for(|current| *current == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", state))
        .expect("state channel closed");
}

/// Poll `condition` until it holds or the wait times out
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Callback that forwards every event into a channel
pub fn event_channel() -> (
    impl Fn(StateChangeEvent) -> futures::future::Ready<CallbackResult> + Send + Sync + 'static,
    mpsc::UnboundedReceiver<StateChangeEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = move |event: StateChangeEvent| {
        let _ = tx.send(event);
        futures::future::ready(Ok(()))
    };
    (callback, rx)
}

/// Next event delivered to a channel-backed callback
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<StateChangeEvent>) -> StateChangeEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Assert no event arrives within `window`
pub async fn assert_no_event(rx: &mut mpsc::UnboundedReceiver<StateChangeEvent>, window: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(window, rx.recv()).await {
        panic!("unexpected event for {}", event.entity_id);
    }
}

pub fn auth_required() -> String {
    json!({"type": "auth_required", "ha_version": "2024.2.0"}).to_string()
}

pub fn auth_ok() -> String {
    json!({"type": "auth_ok", "ha_version": "2024.2.0"}).to_string()
}

pub fn auth_invalid() -> String {
    json!({"type": "auth_invalid", "message": "Invalid access token or password"}).to_string()
}

pub fn result_ok(id: u64) -> String {
    json!({"id": id, "type": "result", "success": true, "result": null}).to_string()
}

/// Entity state object as carried in a trigger
pub fn entity_state(entity_id: &str, state: &str) -> Value {
    json!({
        "entity_id": entity_id,
        "state": state,
        "attributes": {"friendly_name": entity_id},
        "last_changed": "2024-02-14T10:30:00.123456+00:00",
        "last_updated": "2024-02-14T10:30:00.123456+00:00",
        "context": {"id": "01HPJ", "parent_id": null, "user_id": null}
    })
}

/// `event` frame for subscription `id` with raw trigger states
pub fn trigger_event(id: u64, to_state: Value, from_state: Value) -> String {
    json!({
        "id": id,
        "type": "event",
        "event": {
            "variables": {
                "trigger": {
                    "id": "0",
                    "idx": "0",
                    "alias": null,
                    "platform": "state",
                    "entity_id": to_state["entity_id"].clone(),
                    "from_state": from_state,
                    "to_state": to_state,
                    "for": null,
                    "attribute": null,
                    "description": "state of entity"
                }
            },
            "context": null
        }
    })
    .to_string()
}

/// `event` frame moving `entity_id` from `old` to `new`
pub fn state_event(id: u64, entity_id: &str, new: &str, old: &str) -> String {
    trigger_event(id, entity_state(entity_id, new), entity_state(entity_id, old))
}

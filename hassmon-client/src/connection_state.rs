//! Connection state of the active session
//!
//! ```text
//! Disconnected → Connecting → Authenticating → Subscribing → Live
//!       ↑             │              │               │         │
//!       └─────────────┴──────────────┴───────────────┴─────────┘
//!                  transport closed, error or auth_invalid
//! ```
//!
//! Only the session task writes the state. It is published through a
//! `tokio::sync::watch` channel so the `StateMonitor` handle and tests can
//! observe transitions without sharing a lock with the read loop.

use crate::MonitorMetrics;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Protocol state of the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport open
    Disconnected,
    /// Transport opening, waiting for `auth_required`
    Connecting,
    /// `auth` sent, waiting for `auth_ok`
    Authenticating,
    /// Sending `subscribe_trigger` requests
    Subscribing,
    /// All subscriptions sent; events are being routed
    Live,
}

impl ConnectionState {
    /// Numeric encoding used by the connection-state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Authenticating => 2,
            ConnectionState::Subscribing => 3,
            ConnectionState::Live => 4,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Live => "live",
        };
        f.write_str(name)
    }
}

/// Publishes state transitions to watchers and the gauge
#[derive(Clone)]
pub(crate) struct StateTracker {
    tx: Arc<watch::Sender<ConnectionState>>,
    metrics: Option<Arc<MonitorMetrics>>,
}

impl StateTracker {
    pub(crate) fn new(metrics: Option<Arc<MonitorMetrics>>) -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            tx: Arc::new(tx),
            metrics,
        }
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Connection state changed");
            if let Some(ref m) = self.metrics {
                m.update_connection_state(state.as_gauge());
            }
        }
    }

    pub(crate) fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

//! Background reconnect loop
//!
//! Runs one `ConnectionSession` at a time. When a session ends without a
//! shutdown request, the reconnection strategy decides how long to wait before
//! the next one, or whether to give up.

use crate::session::{wait_for_shutdown, ConnectionSession, SessionContext};
use crate::{ConnectionState, ReconnectionStrategy};
use hassmon_core::Error;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

pub(crate) type SharedStrategy = Arc<Mutex<Box<dyn ReconnectionStrategy>>>;

pub(crate) fn shared_strategy(strategy: Box<dyn ReconnectionStrategy>) -> SharedStrategy {
    Arc::new(Mutex::new(strategy))
}

pub(crate) struct Supervisor {
    ctx: SessionContext,
    strategy: SharedStrategy,
    stop_on_auth_failure: bool,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    pub(crate) fn new(
        ctx: SessionContext,
        strategy: SharedStrategy,
        stop_on_auth_failure: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            strategy,
            stop_on_auth_failure,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            if let Some(ref m) = self.ctx.metrics {
                m.record_session_started();
            }

            let (outcome, reached_live) = {
                let mut session = ConnectionSession::new(&self.ctx, self.shutdown.clone());
                let outcome = session.run().await;
                (outcome, session.reached_live())
            };

            if reached_live {
                attempt = 0;
                self.strategy.lock().await.reset();
            }

            match outcome {
                Ok(()) => break,
                Err(Error::ConnectionClosed) => {
                    if let Some(ref m) = self.ctx.metrics {
                        m.record_error(error_kind(&Error::ConnectionClosed));
                    }
                    tracing::info!("Session closed by server");
                }
                Err(e) if e.is_auth_failure() => {
                    if let Some(ref m) = self.ctx.metrics {
                        m.record_auth_failure();
                    }
                    if self.stop_on_auth_failure {
                        tracing::error!(error = %e, "Authentication failed, not reconnecting");
                        break;
                    }
                    tracing::error!(error = %e, "Authentication failed");
                }
                Err(e) if e.is_retryable() => {
                    if let Some(ref m) = self.ctx.metrics {
                        m.record_error(error_kind(&e));
                    }
                    tracing::warn!(error = %e, "Session ended with error");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Session failed with unrecoverable error");
                    break;
                }
            }

            if *self.shutdown.borrow() {
                break;
            }

            let delay = self.strategy.lock().await.next_delay(attempt);
            let Some(delay) = delay else {
                tracing::error!(attempt, "Reconnection abandoned");
                break;
            };
            attempt = attempt.saturating_add(1);

            if let Some(ref m) = self.ctx.metrics {
                m.record_reconnect_attempt();
            }
            tracing::warn!(
                attempt,
                delay_secs = delay.as_secs_f64(),
                "Reconnecting after delay"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut self.shutdown) => break,
            }
        }

        self.ctx.table.clear().await;
        self.ctx.state.set(ConnectionState::Disconnected);
        tracing::info!("Monitoring task finished");
    }
}

fn error_kind(error: &Error) -> &'static str {
    match error {
        Error::WebSocket(_) => "websocket",
        Error::ConnectionClosed => "connection_closed",
        Error::Protocol(_) => "protocol",
        Error::Serialization(_) => "serialization",
        Error::AuthenticationFailed(_) => "auth",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Entities;
    use crate::connection_state::StateTracker;
    use crate::{Dispatcher, FixedDelay, NoReconnect, SubscriptionTable};
    use hassmon_core::{SemanticType, ValueConverter};
    use std::time::Duration;

    fn unreachable_context() -> SessionContext {
        let mut entities = Entities::new();
        entities.insert("sensor.a", SemanticType::Numeric);
        SessionContext {
            // Port 9 on localhost refuses connections.
            url: "ws://127.0.0.1:9/api/websocket".to_string(),
            token: "token".to_string(),
            entities,
            converter: ValueConverter::default(),
            table: SubscriptionTable::new(),
            dispatcher: Dispatcher::noop(),
            state: StateTracker::new(None),
            metrics: None,
        }
    }

    #[tokio::test]
    async fn test_gives_up_when_strategy_returns_none() {
        let ctx = unreachable_context();
        let state = ctx.state.clone();
        let strategy = shared_strategy(Box::new(NoReconnect));
        let (_tx, rx) = watch::channel(false);

        let supervisor = Supervisor::new(ctx, strategy, false, rx);
        tokio::time::timeout(Duration::from_secs(5), supervisor.run())
            .await
            .expect("supervisor should stop after the first failed session");
        assert_eq!(state.current(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_retries_until_max_attempts() {
        let ctx = unreachable_context();
        let strategy = shared_strategy(Box::new(
            FixedDelay::new(Duration::from_millis(10)).with_max_attempts(3),
        ));
        let (_tx, rx) = watch::channel(false);

        let supervisor = Supervisor::new(ctx, strategy, false, rx);
        tokio::time::timeout(Duration::from_secs(5), supervisor.run())
            .await
            .expect("supervisor should give up after three retries");
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff_sleep() {
        let ctx = unreachable_context();
        let strategy = shared_strategy(Box::new(FixedDelay::new(Duration::from_secs(3600))));
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(Supervisor::new(ctx, strategy, false, rx).run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send_replace(true);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor should observe shutdown while sleeping")
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let ctx = unreachable_context();
        let strategy = shared_strategy(Box::new(FixedDelay::default()));
        let (tx, rx) = watch::channel(true);

        Supervisor::new(ctx, strategy, false, rx).run().await;
        drop(tx);
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(error_kind(&Error::WebSocket("x".into())), "websocket");
        assert_eq!(error_kind(&Error::Protocol("x".into())), "protocol");
        assert_eq!(error_kind(&Error::ConnectionClosed), "connection_closed");
        assert_eq!(error_kind(&Error::AlreadyRunning), "other");
    }
}

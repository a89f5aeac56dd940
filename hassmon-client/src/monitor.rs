//! The `StateMonitor` handle
//!
//! `start()` spawns the background supervisor on the current Tokio runtime and
//! returns immediately. `stop()` requests shutdown, clears the subscription
//! table and waits up to the configured timeout for the task to finish. A task
//! that outlives the timeout keeps running until its transport closes, and the
//! monitor refuses to start again until it has.
//!
//! Dropping the monitor also ends the background task.

use crate::config::MonitorConfig;
use crate::connection_state::StateTracker;
use crate::session::SessionContext;
use crate::supervisor::{SharedStrategy, Supervisor};
use crate::{ConnectionState, Dispatcher, MonitorMetrics, ReconnectionStrategy, SubscriptionTable};
use hassmon_core::{EntitySpec, Error, Result, ValueConverter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Live monitor of Home Assistant entity states
///
/// Built with [`MonitorBuilder`](crate::MonitorBuilder).
pub struct StateMonitor {
    config: MonitorConfig,
    context: SessionContext,
    strategy: SharedStrategy,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl StateMonitor {
    pub(crate) fn new(
        config: MonitorConfig,
        url: String,
        dispatcher: Dispatcher,
        strategy: Box<dyn ReconnectionStrategy>,
        metrics: Option<Arc<MonitorMetrics>>,
    ) -> Self {
        let context = SessionContext {
            url,
            token: config.token.clone(),
            entities: config.entities.clone(),
            converter: ValueConverter::new(config.timezone),
            table: SubscriptionTable::new(),
            dispatcher,
            state: StateTracker::new(metrics.clone()),
            metrics,
        };

        Self {
            config,
            context,
            strategy: crate::supervisor::shared_strategy(strategy),
            shutdown_tx: None,
            task: None,
        }
    }

    /// Spawn the monitoring task
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyRunning` if a previous task is still alive
    /// - `Error::Internal` when called outside a Tokio runtime
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("start() requires a Tokio runtime: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = Supervisor::new(
            self.context.clone(),
            Arc::clone(&self.strategy),
            self.config.stop_on_auth_failure,
            shutdown_rx,
        );

        tracing::info!(
            url = %self.context.url,
            entities = self.context.entities.len(),
            "Starting state monitor"
        );
        self.task = Some(runtime.spawn(supervisor.run()));
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Stop with the configured shutdown timeout
    pub async fn stop(&mut self) {
        self.stop_with_timeout(self.config.shutdown_timeout).await
    }

    /// Request shutdown and wait up to `timeout` for the task to end
    ///
    /// Safe to call repeatedly, and before `start()`.
    pub async fn stop_with_timeout(&mut self, timeout: Duration) {
        if let Some(ref tx) = self.shutdown_tx {
            tx.send_replace(true);
        }
        self.context.table.clear().await;

        let Some(mut task) = self.task.take() else {
            tracing::debug!("No active monitoring task to stop");
            return;
        };

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => tracing::info!("State monitor stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "Monitoring task ended abnormally"),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "Monitoring task did not stop within timeout"
                );
                self.task = Some(task);
                return;
            }
        }
        self.shutdown_tx = None;
    }

    /// Whether the background task is alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Latest connection state published by the active session
    pub fn connection_state(&self) -> ConnectionState {
        self.context.state.current()
    }

    /// Receiver that observes every connection state transition
    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.context.state.subscribe()
    }

    /// Active subscriptions as `(subscription id, entity id)`, ordered by id
    pub async fn subscriptions(&self) -> Vec<(u64, String)> {
        self.context.table.snapshot().await
    }

    /// Monitored entities in declaration order
    pub fn entities(&self) -> impl Iterator<Item = &EntitySpec> {
        self.config.entities.iter()
    }

    /// The WebSocket URL sessions connect to
    pub fn url(&self) -> &str {
        &self.context.url
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

impl std::fmt::Debug for StateMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMonitor")
            .field("config", &self.config)
            .field("url", &self.context.url)
            .field("running", &self.is_running())
            .field("connection_state", &self.connection_state())
            .finish()
    }
}

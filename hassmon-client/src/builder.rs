//! Builder for configuring a `StateMonitor`
//!
//! The `MonitorBuilder` provides a fluent API for everything a monitor needs
//! before it can start:
//! - The endpoint, access token and monitored entities
//! - An optional target time zone for timestamps
//! - The reconnection strategy and auth-failure policy
//! - Observability (OpenTelemetry)
//!
//! Setters that parse their input (`entity_typed`, `timezone_name`) never
//! fail on the spot; the first error is kept and returned by `build()`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hassmon_client::{ExponentialBackoff, MonitorBuilder};
//! use hassmon_core::SemanticType;
//!
//! # async fn example() -> hassmon_core::Result<()> {
//! let mut monitor = MonitorBuilder::new("homeassistant.local:8123", "long-lived-token")
//!     .entity("sensor.outdoor_temperature", SemanticType::Numeric)
//!     .entity_typed("binary_sensor.front_door", "bool")
//!     .timezone_name("Europe/Berlin")
//!     .reconnect(Box::new(ExponentialBackoff::default()))
//!     .on_state_change(|event| async move {
//!         println!("{} -> {:?}", event.entity_id, event.new_state);
//!         Ok(())
//!     })
//!     .build()?;
//!
//! monitor.start()?;
//! // ...
//! monitor.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::config::{parse_timezone, MonitorConfig};
use crate::dispatcher::CallbackResult;
use crate::reconnect::{FixedDelay, ReconnectionStrategy};
use crate::{Dispatcher, MonitorMetrics, StateMonitor};
use hassmon_core::{EntitySpec, Error, ObservabilityConfig, Result, SemanticType, StateChangeEvent, Tz};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring and creating a `StateMonitor`
pub struct MonitorBuilder {
    config: MonitorConfig,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    dispatcher: Option<Dispatcher>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
    deferred_error: Option<Error>,
}

impl MonitorBuilder {
    /// Create a builder for `endpoint` (host, `http(s)://` or `ws(s)://` URL)
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self::from_config(MonitorConfig::new(endpoint, token))
    }

    /// Start from an existing configuration, e.g. `MonitorConfig::from_env()`
    pub fn from_config(config: MonitorConfig) -> Self {
        Self {
            config,
            reconnect_strategy: None,
            dispatcher: None,
            observability_config: None,
            service_name: None,
            deferred_error: None,
        }
    }

    /// Monitor `entity_id`, converting its state to `semantic_type`
    pub fn entity(mut self, entity_id: impl Into<String>, semantic_type: SemanticType) -> Self {
        self.config.entities.insert(entity_id, semantic_type);
        self
    }

    /// Monitor `entity_id` with the type given by name (`numeric`, `str`, `bool`, ...)
    pub fn entity_typed(self, entity_id: impl Into<String>, type_name: &str) -> Self {
        match type_name.parse::<SemanticType>() {
            Ok(semantic_type) => self.entity(entity_id, semantic_type),
            Err(e) => self.defer(e),
        }
    }

    pub fn entities<I>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = EntitySpec>,
    {
        for spec in specs {
            self.config.entities.insert(spec.entity_id, spec.semantic_type);
        }
        self
    }

    /// Convert every timestamp into `tz`
    pub fn timezone(mut self, tz: Tz) -> Self {
        self.config.timezone = Some(tz);
        self
    }

    /// Convert every timestamp into the IANA zone `name`
    pub fn timezone_name(mut self, name: &str) -> Self {
        match parse_timezone(name) {
            Ok(tz) => {
                self.config.timezone = Some(tz);
                self
            }
            Err(e) => self.defer(e),
        }
    }

    /// Use `strategy` to pace reconnects (default: fixed 5 s delay, forever)
    pub fn reconnect(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self
    }

    /// Reconnect after a constant `delay`, forever
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_strategy = Some(Box::new(FixedDelay::new(delay)));
        self
    }

    /// End the monitoring task when Home Assistant rejects the token
    pub fn stop_on_auth_failure(mut self, stop: bool) -> Self {
        self.config.stop_on_auth_failure = stop;
        self
    }

    /// How long `stop()` waits for the background task
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Callback invoked for every state change, in arrival order
    pub fn on_state_change<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(StateChangeEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        self.dispatcher = Some(Dispatcher::new(callback));
        self
    }

    fn defer(mut self, error: Error) -> Self {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(error);
        }
        self
    }

    /// Validate the configuration and create the monitor
    ///
    /// # Errors
    ///
    /// - `Error::Config` for an empty or malformed endpoint, an empty token,
    ///   no entities or no callback
    /// - `Error::UnknownSemanticType` / `Error::InvalidTimezone` from
    ///   `entity_typed` / `timezone_name`
    /// - `Error::Internal` if observability fails to initialize
    pub fn build(self) -> Result<StateMonitor> {
        if let Some(error) = self.deferred_error {
            return Err(error);
        }

        self.config.validate()?;
        let url = self.config.url()?;
        let dispatcher = self
            .dispatcher
            .ok_or_else(|| Error::Config("a state change callback is required".to_string()))?;

        // Initialize observability if configured
        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            hassmon_core::init_observability(config.clone())
                .map_err(|e| Error::Internal(format!("Failed to initialize observability: {}", e)))?;

            Some(Arc::new(MonitorMetrics::new(config.service_name)))
        } else {
            None
        };

        let strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(FixedDelay::default()));

        tracing::debug!(url = %url, entities = self.config.entities.len(), "Monitor configured");
        Ok(StateMonitor::new(self.config, url, dispatcher, strategy, metrics))
    }
}

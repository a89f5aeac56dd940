//! Real-time Home Assistant entity state monitor over WebSocket
//!
//! This crate keeps a long-lived connection to Home Assistant's WebSocket API,
//! subscribes to state triggers for a chosen set of entities and hands every
//! change to a user callback with the state converted to its declared type.
//!
//! # Core Features
//!
//! - **Handshake**: answers `auth_required` with the access token
//! - **Subscriptions**: one `subscribe_trigger` per entity, ids starting at 1
//!   per session, tracked in a table that is cleared on every disconnect
//! - **Typed values**: numeric, integer, boolean, string and datetime states,
//!   with optional time zone normalisation
//! - **Fault isolation**: a failing or panicking callback is logged and the
//!   stream keeps flowing
//! - **Auto-Reconnection**: fixed delay by default, exponential backoff or none
//! - **Observability**: OpenTelemetry integration for traces and metrics
//!
//! Delivery is best effort: events emitted while disconnected are lost.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hassmon_client::MonitorBuilder;
//! use hassmon_core::SemanticType;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut monitor = MonitorBuilder::new("homeassistant.local:8123", "token")
//!         .entity("sensor.temp", SemanticType::Numeric)
//!         .entity("light.kitchen", SemanticType::String)
//!         .on_state_change(|event| async move {
//!             println!("{}: {:?} -> {:?}", event.entity_id, event.old_state, event.new_state);
//!             Ok(())
//!         })
//!         .build()?;
//!
//!     monitor.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     monitor.stop().await;
//!     Ok(())
//! }
//! ```

mod builder;
mod config;
mod connection_state;
mod dispatcher;
mod metrics;
mod monitor;
mod reconnect;
mod session;
mod subscription;
mod supervisor;

pub use builder::MonitorBuilder;
pub use config::{
    parse_timezone, websocket_url, Entities, MonitorConfig, DEFAULT_SHUTDOWN_TIMEOUT, ENV_HOSTNAME,
    ENV_TIMEZONE, ENV_TOKEN, WEBSOCKET_PATH,
};
pub use connection_state::ConnectionState;
pub use dispatcher::{CallbackError, CallbackResult, DispatchOutcome, Dispatcher, EventCallback};
pub use metrics::MonitorMetrics;
pub use monitor::StateMonitor;
pub use reconnect::{
    ExponentialBackoff, FixedDelay, NoReconnect, ReconnectionStrategy, DEFAULT_RECONNECT_DELAY,
};
pub use subscription::SubscriptionTable;

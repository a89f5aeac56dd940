//! hassmon - live Home Assistant entity state monitoring
//!
//! This is the main convenience crate that re-exports the hassmon sub-crates.
//! Use it if you want a single dependency for the whole monitor.
//!
//! # Architecture
//!
//! - **hassmon-core**: types, frame codec, value conversion, error handling,
//!   observability
//! - **hassmon-client**: connection session, subscription table, dispatcher,
//!   reconnect supervisor and the `StateMonitor` handle
//!
//! The crate also ships the `hassmon` binary, which prints state changes for
//! the entities given on the command line.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hassmon::{MonitorBuilder, SemanticType};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut monitor = MonitorBuilder::new("https://ha.example.com", "token")
//!         .entity("sensor.power", SemanticType::Numeric)
//!         .entity_typed("input_datetime.wake_up", "datetime")
//!         .timezone_name("America/New_York")
//!         .reconnect_delay(Duration::from_secs(10))
//!         .on_state_change(|event| async move {
//!             println!("{}", serde_json::to_string(&event)?);
//!             Ok::<(), hassmon::client::CallbackError>(())
//!         })
//!         .build()?;
//!
//!     monitor.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     monitor.stop().await;
//!     Ok(())
//! }
//! ```

// Re-export the sub-crates under short names
pub use hassmon_client as client;
pub use hassmon_core as core;

// Convenience re-exports of the most commonly used types
pub use hassmon_client::{
    ConnectionState, ExponentialBackoff, FixedDelay, MonitorBuilder, MonitorConfig, NoReconnect,
    StateMonitor,
};
pub use hassmon_core::{
    EntitySpec, Error, ObservabilityConfig, Result, SemanticType, StateChangeEvent, StateValue,
    Timestamp, Tz,
};

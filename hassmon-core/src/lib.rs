//! Core types, frame codec and value conversion for hassmon
//!
//! This crate holds everything about the Home Assistant state-monitoring
//! protocol that does not need a socket:
//!
//! - **Types**: semantic types, typed state values, timestamps and the
//!   `StateChangeEvent` record delivered to callbacks
//! - **Codec**: the inbound/outbound WebSocket frame shapes
//! - **Convert**: raw state text to typed values, ISO-8601 timestamps with
//!   optional time zone normalisation
//! - **Error handling**: the shared `Error` enum
//! - **Observability**: `tracing` subscriber and OpenTelemetry setup
//!
//! The `hassmon-client` crate builds the connection, subscription and
//! reconnect machinery on top of it.
//!
//! # Example
//!
//! ```rust
//! use hassmon_core::{codec, SemanticType, ValueConverter};
//!
//! let frame = codec::decode(r#"{"type":"auth_ok","ha_version":"2024.2.0"}"#).unwrap();
//! assert!(matches!(frame, codec::InboundFrame::AuthOk { .. }));
//!
//! let value = ValueConverter::default().convert(Some("3.7"), SemanticType::Integer);
//! assert_eq!(value.and_then(|v| v.as_i64()), Some(3));
//! ```

pub mod codec;
pub mod convert;
pub mod error;
pub mod observability;
pub mod types;

pub use chrono_tz::Tz;
pub use convert::{convert_value, parse_timestamp, TimestampConverter, ValueConverter};
pub use error::{Error, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{Attributes, EntitySpec, SemanticType, StateChangeEvent, StateValue, Timestamp};

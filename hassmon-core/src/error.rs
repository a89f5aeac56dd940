//! Error types for hassmon
//!
//! A single `Error` enum covers every failure the monitor can report. Most of
//! them never reach the caller: only configuration problems are returned
//! synchronously (from `MonitorBuilder::build` or `StateMonitor::start`).
//! Everything that happens on the background task is logged and, where
//! appropriate, answered with a reconnect.
//!
//! # Error Categories
//!
//! - **Configuration**: Config, UnknownSemanticType, InvalidTimezone, AlreadyRunning
//! - **Protocol**: Protocol, Serialization
//! - **Authentication**: AuthenticationFailed
//! - **Transport**: WebSocket, ConnectionClosed
//! - **Other**: Internal
//!
//! Value and timestamp conversion never produce an error; unparsable input
//! becomes an absent value instead.
//!
//! # Examples
//!
//! ```rust
//! use hassmon_core::Error;
//!
//! let err = Error::Config("entity set cannot be empty".into());
//! assert!(!err.is_retryable());
//! assert!(Error::ConnectionClosed.is_retryable());
//! ```

use thiserror::Error;

/// Result type for hassmon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for hassmon
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Invalid monitor configuration (empty endpoint, token or entity set)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An entity was declared with a type name outside the supported set
    #[error("Unknown semantic type: {0}")]
    UnknownSemanticType(String),

    /// The configured time zone is not a known IANA name
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A frame was received that could not be decoded
    ///
    /// The offending frame is dropped and the session continues.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// WebSocket transport layer error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The event source rejected the access token
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The connection was closed by either side
    #[error("Connection closed")]
    ConnectionClosed,

    /// `start()` was called on a monitor that is already running
    #[error("Monitor is already running")]
    AlreadyRunning,

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the supervisor may recover from this error by reconnecting
    ///
    /// Transport and protocol failures are retryable. Configuration errors
    /// are not. Authentication failures are reported as retryable here; the
    /// supervisor decides separately whether to honour that, depending on
    /// `stop_on_auth_failure`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::WebSocket(_)
                | Error::ConnectionClosed
                | Error::Protocol(_)
                | Error::Serialization(_)
                | Error::AuthenticationFailed(_)
        )
    }

    /// Whether this error is an explicit authentication rejection
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::AuthenticationFailed(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

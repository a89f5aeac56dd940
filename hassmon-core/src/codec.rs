//! Frame codec for the Home Assistant WebSocket API
//!
//! Inbound frames are JSON objects discriminated by their `type` field. They
//! decode into the closed `InboundFrame` enum; any `type` the client does not
//! know decodes to `InboundFrame::Unknown` so that new server-side message
//! kinds never break an existing session.
//!
//! Outbound, the monitor only ever sends two frames: the `auth` handshake
//! reply and one `subscribe_trigger` request per monitored entity.
//!
//! # Examples
//!
//! ```rust
//! use hassmon_core::codec::{self, InboundFrame, OutboundFrame};
//!
//! let frame = codec::decode(r#"{"type":"auth_required","ha_version":"2024.2.0"}"#).unwrap();
//! assert!(matches!(frame, InboundFrame::AuthRequired { .. }));
//!
//! let text = codec::encode(&OutboundFrame::subscribe_state(1, "sensor.temp")).unwrap();
//! assert!(text.contains("\"subscribe_trigger\""));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Attributes;

/// A frame received from the event source
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// First frame of every session; the client must answer with `auth`
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    /// The access token was accepted
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    /// The access token was rejected
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    /// Acknowledgement of a command such as `subscribe_trigger`
    Result {
        id: u64,
        #[serde(default)]
        success: bool,
        #[serde(default)]
        error: Option<ResultError>,
    },
    /// A trigger fired for subscription `id`
    Event { id: u64, event: EventBody },
    /// Any frame type this client does not understand
    #[serde(other)]
    Unknown,
}

/// Error object carried by a failed `result` frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultError {
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl std::fmt::Display for ResultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{}: {}", code, message),
            (None, Some(message)) => f.write_str(message),
            (Some(code), None) => write!(f, "{}", code),
            (None, None) => f.write_str("unspecified error"),
        }
    }
}

/// Body of an `event` frame
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventBody {
    #[serde(default)]
    pub variables: Option<EventVariables>,
}

impl EventBody {
    /// The trigger payload, if the frame carried one
    pub fn trigger(&self) -> Option<&Trigger> {
        self.variables.as_ref().and_then(|v| v.trigger.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventVariables {
    #[serde(default)]
    pub trigger: Option<Trigger>,
}

/// A state trigger: the entity moved from `from_state` to `to_state`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Trigger {
    #[serde(default)]
    pub to_state: Option<EntityState>,
    #[serde(default)]
    pub from_state: Option<EntityState>,
    #[serde(default, rename = "for")]
    pub for_duration: Option<serde_json::Value>,
}

impl Trigger {
    /// The `for` duration as text; non-string payloads are rendered as JSON
    pub fn for_duration_text(&self) -> Option<String> {
        value_to_text(self.for_duration.as_ref()?)
    }
}

/// Snapshot of one entity inside a trigger
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EntityState {
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub state: Option<serde_json::Value>,
    #[serde(default)]
    pub attributes: Option<Attributes>,
    #[serde(default)]
    pub last_changed: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl EntityState {
    /// The state as text
    ///
    /// Home Assistant always sends strings, but a number or boolean is
    /// tolerated and rendered as its JSON text.
    pub fn state_text(&self) -> Option<String> {
        value_to_text(self.state.as_ref()?)
    }
}

fn value_to_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A frame sent to the event source
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Handshake reply carrying the long-lived access token
    Auth { access_token: String },
    /// Subscribe to a trigger; events for it arrive with the same `id`
    SubscribeTrigger { id: u64, trigger: TriggerSpec },
}

impl OutboundFrame {
    pub fn auth(access_token: impl Into<String>) -> Self {
        OutboundFrame::Auth {
            access_token: access_token.into(),
        }
    }

    /// A `state` platform trigger for a single entity
    pub fn subscribe_state(id: u64, entity_id: impl Into<String>) -> Self {
        OutboundFrame::SubscribeTrigger {
            id,
            trigger: TriggerSpec {
                platform: "state".to_string(),
                entity_id: entity_id.into(),
            },
        }
    }
}

/// Trigger definition inside a `subscribe_trigger` request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerSpec {
    pub platform: String,
    pub entity_id: String,
}

/// Decode a text frame
///
/// # Errors
///
/// `Error::Protocol` if the text is not JSON or a known frame type is
/// missing required fields. Unknown frame types are not an error.
pub fn decode(text: &str) -> Result<InboundFrame> {
    serde_json::from_str(text).map_err(|e| Error::Protocol(e.to_string()))
}

/// Encode an outbound frame to JSON text
pub fn encode(frame: &OutboundFrame) -> Result<String> {
    serde_json::to_string(frame).map_err(|e| Error::Serialization(e.to_string()))
}

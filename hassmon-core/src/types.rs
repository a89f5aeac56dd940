//! Domain types shared by the monitor
//!
//! - **SemanticType**: the declared conversion target for an entity's state
//! - **StateValue**: a state converted to its semantic type
//! - **Timestamp**: an ISO-8601 instant, with or without offset information
//! - **EntitySpec**: one monitored entity and its declared type
//! - **StateChangeEvent**: the record handed to the user callback
//!
//! Entity states arrive from Home Assistant as text. They are kept verbatim in
//! the `*_raw` fields of a `StateChangeEvent` and converted alongside, so a
//! consumer always has both the typed value and the original string.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Loosely typed attribute payload of an entity state
///
/// Attributes are passed through untouched; the monitor never interprets them.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Declared conversion target for an entity's textual state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    /// 64-bit floating point
    Numeric,
    /// ISO-8601 timestamp
    Datetime,
    /// Raw text, unchanged
    String,
    /// `on`/`off`, `true`/`false`, `1`/`0`
    Boolean,
    /// Floating point truncated toward zero
    Integer,
}

impl SemanticType {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Numeric => "numeric",
            SemanticType::Datetime => "datetime",
            SemanticType::String => "string",
            SemanticType::Boolean => "boolean",
            SemanticType::Integer => "integer",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SemanticType {
    type Err = Error;

    /// Parse the configuration spelling of a type
    ///
    /// Accepts `numeric`, `datetime`, `str`, `string`, `bool`, `boolean`,
    /// `int` and `integer`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numeric" => Ok(SemanticType::Numeric),
            "datetime" => Ok(SemanticType::Datetime),
            "str" | "string" => Ok(SemanticType::String),
            "bool" | "boolean" => Ok(SemanticType::Boolean),
            "int" | "integer" => Ok(SemanticType::Integer),
            other => Err(Error::UnknownSemanticType(other.to_string())),
        }
    }
}

/// An instant parsed from an ISO-8601 string
///
/// Home Assistant sometimes emits local times without an offset. Those stay
/// `Naive` unless a target time zone is configured, in which case they are
/// pinned to that zone without shifting the clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Instant with a known UTC offset
    Zoned(DateTime<FixedOffset>),
    /// Wall-clock reading with no offset information
    Naive(NaiveDateTime),
}

impl Timestamp {
    /// Wall-clock reading in the timestamp's own offset
    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            Timestamp::Zoned(dt) => dt.naive_local(),
            Timestamp::Naive(naive) => *naive,
        }
    }

    /// UTC offset, if one is known
    pub fn offset(&self) -> Option<FixedOffset> {
        match self {
            Timestamp::Zoned(dt) => Some(*dt.offset()),
            Timestamp::Naive(_) => None,
        }
    }

    /// Absolute instant, if the offset is known
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Zoned(dt) => Some(dt.with_timezone(&Utc)),
            Timestamp::Naive(_) => None,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Zoned(dt) => write!(f, "{}", dt.to_rfc3339()),
            Timestamp::Naive(naive) => write!(f, "{}", naive.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

/// A state value converted to its declared semantic type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StateValue {
    Numeric(f64),
    Integer(i64),
    Boolean(bool),
    String(String),
    Datetime(Timestamp),
}

impl StateValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Numeric(v) => Some(*v),
            StateValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&Timestamp> {
        match self {
            StateValue::Datetime(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Numeric(v) => write!(f, "{}", v),
            StateValue::Integer(v) => write!(f, "{}", v),
            StateValue::Boolean(v) => write!(f, "{}", v),
            StateValue::String(v) => f.write_str(v),
            StateValue::Datetime(v) => write!(f, "{}", v),
        }
    }
}

/// One monitored entity and the type its state converts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpec {
    pub entity_id: String,
    pub semantic_type: SemanticType,
}

impl EntitySpec {
    pub fn new(entity_id: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            entity_id: entity_id.into(),
            semantic_type,
        }
    }
}

/// A decoded state change, delivered once to the user callback
///
/// `from_state` absent means the entity just appeared; `to_state` absent
/// means it was removed. In both cases the corresponding fields are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChangeEvent {
    /// Home Assistant entity id, e.g. `sensor.temperature`
    pub entity_id: String,
    /// Per-session subscription id the event arrived on
    pub subscription_id: u64,
    /// Declared conversion target for this entity
    pub data_type: SemanticType,
    pub new_state: Option<StateValue>,
    pub old_state: Option<StateValue>,
    pub new_state_raw: Option<String>,
    pub old_state_raw: Option<String>,
    pub new_attributes: Option<Attributes>,
    pub old_attributes: Option<Attributes>,
    /// When the state value last changed (from `to_state`)
    pub last_changed: Option<Timestamp>,
    /// When the state or its attributes last updated (from `to_state`)
    pub last_updated: Option<Timestamp>,
    /// The trigger's `for` duration, carried verbatim
    pub for_duration: Option<String>,
}

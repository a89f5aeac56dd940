//! Conversion of raw entity states into typed values
//!
//! Home Assistant reports every state as text, and routinely reports the
//! placeholders `unknown` and `unavailable` while a device is booting or
//! offline. Conversion therefore never fails: anything that cannot be read as
//! the declared type becomes `None`.
//!
//! # Timestamps
//!
//! Timestamps are ISO-8601 calendar dates with an optional time, in extended
//! (`2024-02-14T10:30:00`) or basic (`20240214T103000`) form. The time may be
//! reduced to hours or minutes and use `,` as decimal mark. A trailing `Z` is
//! read as `+00:00`. When a target zone is configured:
//!
//! - an offset-carrying timestamp is moved into that zone (same instant)
//! - a naive timestamp is pinned to that zone (same clock reading)
//!
//! Without a target zone the parsed value is returned as-is, naive or not.
//!
//! # Examples
//!
//! ```rust
//! use hassmon_core::{SemanticType, StateValue, ValueConverter};
//!
//! let converter = ValueConverter::default();
//! assert_eq!(
//!     converter.convert(Some("21.5"), SemanticType::Numeric),
//!     Some(StateValue::Numeric(21.5))
//! );
//! assert_eq!(converter.convert(Some("unavailable"), SemanticType::Numeric), None);
//! assert_eq!(
//!     converter.convert(Some("ON"), SemanticType::Boolean),
//!     Some(StateValue::Boolean(true))
//! );
//! ```

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;

use crate::types::{SemanticType, StateValue, Timestamp};

/// Placeholder state for an entity whose value is not known yet
pub const STATE_UNKNOWN: &str = "unknown";
/// Placeholder state for an entity whose device is offline
pub const STATE_UNAVAILABLE: &str = "unavailable";

// Inputs are rewritten to the extended form before matching these.
const ZONED_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z"];

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Longest DST gap searched backwards when pinning a reading inside one
const MAX_GAP_HOURS: i64 = 24;

/// Parses ISO-8601 timestamps, optionally normalising them into one zone
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampConverter {
    target_tz: Option<Tz>,
}

impl TimestampConverter {
    pub fn new(target_tz: Option<Tz>) -> Self {
        Self { target_tz }
    }

    pub fn target_tz(&self) -> Option<Tz> {
        self.target_tz
    }

    /// Parse a timestamp; `None` for absent, empty or unparsable input
    pub fn parse(&self, raw: Option<&str>) -> Option<Timestamp> {
        parse_timestamp(raw, self.target_tz)
    }
}

/// Converts raw state strings to their declared semantic type
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueConverter {
    timestamps: TimestampConverter,
}

impl ValueConverter {
    pub fn new(target_tz: Option<Tz>) -> Self {
        Self {
            timestamps: TimestampConverter::new(target_tz),
        }
    }

    /// The timestamp converter used for `Datetime` values
    pub fn timestamps(&self) -> &TimestampConverter {
        &self.timestamps
    }

    pub fn convert(&self, raw: Option<&str>, kind: SemanticType) -> Option<StateValue> {
        convert_value(raw, kind, self.timestamps.target_tz)
    }
}

/// Convert a raw state to `kind`
///
/// `None`, `"unknown"` and `"unavailable"` always yield `None`. The
/// placeholder match is case-sensitive, as Home Assistant emits them lowercase.
pub fn convert_value(raw: Option<&str>, kind: SemanticType, target_tz: Option<Tz>) -> Option<StateValue> {
    let raw = raw?;
    if raw == STATE_UNKNOWN || raw == STATE_UNAVAILABLE {
        return None;
    }

    match kind {
        SemanticType::Numeric => parse_float(raw).map(StateValue::Numeric),
        SemanticType::Integer => parse_float(raw).and_then(truncate_to_i64).map(StateValue::Integer),
        SemanticType::Boolean => parse_bool(raw).map(StateValue::Boolean),
        SemanticType::String => Some(StateValue::String(raw.to_string())),
        SemanticType::Datetime => parse_timestamp(Some(raw), target_tz).map(StateValue::Datetime),
    }
}

/// Parse an ISO-8601 timestamp and apply `target_tz`
pub fn parse_timestamp(raw: Option<&str>, target_tz: Option<Tz>) -> Option<Timestamp> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }

    let parsed = parse_iso8601(raw)?;
    Some(match target_tz {
        Some(tz) => Timestamp::Zoned(into_zone(parsed, tz)),
        None => parsed,
    })
}

fn parse_iso8601(raw: &str) -> Option<Timestamp> {
    let normalized = to_extended_form(raw);

    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(Timestamp::Zoned(dt));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(Timestamp::Naive(naive));
        }
    }

    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(Timestamp::Naive)
}

/// Rewrite basic and reduced ISO-8601 forms into `YYYY-MM-DDTHH:MM[:SS[.f]][+HH:MM]`
///
/// Accepts `T` or a space as separator, `YYYYMMDD` dates, `HH`, `HHMM` and
/// `HHMMSS` clocks, `,` as decimal mark, and `Z`, `+HH`, `+HHMM` offsets.
/// Anything it does not recognise is passed through for the parser to reject.
fn to_extended_form(raw: &str) -> String {
    let (date, time) = match raw.find(['T', ' ']) {
        Some(i) => (&raw[..i], Some(&raw[i + 1..])),
        None => (raw, None),
    };
    let date = extend_date(date);

    match time {
        None => date,
        Some(time) => {
            let split = time.find(['+', '-', 'Z']).unwrap_or(time.len());
            let (clock, offset) = time.split_at(split);
            format!("{}T{}{}", date, extend_clock(clock), extend_offset(offset))
        }
    }
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

fn extend_date(date: &str) -> String {
    if is_digits(date, 8) {
        format!("{}-{}-{}", &date[..4], &date[4..6], &date[6..])
    } else {
        date.to_string()
    }
}

fn extend_clock(clock: &str) -> String {
    let clock = clock.replace(',', ".");
    let (hms, fraction) = match clock.find('.') {
        Some(i) => clock.split_at(i),
        None => (clock.as_str(), ""),
    };

    let hms = if is_digits(hms, 2) {
        format!("{}:00", hms)
    } else if is_digits(hms, 4) {
        format!("{}:{}", &hms[..2], &hms[2..])
    } else if is_digits(hms, 6) {
        format!("{}:{}:{}", &hms[..2], &hms[2..4], &hms[4..])
    } else {
        hms.to_string()
    };
    format!("{}{}", hms, fraction)
}

fn extend_offset(offset: &str) -> String {
    if offset == "Z" {
        return "+00:00".to_string();
    }
    if !offset.starts_with(['+', '-']) {
        return offset.to_string();
    }
    let (sign, rest) = offset.split_at(1);
    if is_digits(rest, 2) {
        format!("{}{}:00", sign, rest)
    } else if is_digits(rest, 4) {
        format!("{}{}:{}", sign, &rest[..2], &rest[2..])
    } else {
        offset.to_string()
    }
}

fn into_zone(ts: Timestamp, tz: Tz) -> DateTime<FixedOffset> {
    match ts {
        Timestamp::Zoned(dt) => dt.with_timezone(&tz).fixed_offset(),
        Timestamp::Naive(naive) => pin_to_zone(naive, tz),
    }
}

/// Attach `tz` to a wall-clock reading without moving the clock
///
/// An ambiguous reading takes the earlier offset. A reading inside a DST gap
/// takes the offset in force just before the gap.
fn pin_to_zone(naive: NaiveDateTime, tz: Tz) -> DateTime<FixedOffset> {
    let offset = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => return dt.fixed_offset(),
        LocalResult::Ambiguous(earliest, _) => return earliest.fixed_offset(),
        LocalResult::None => offset_before_gap(naive, tz),
    };
    let utc = naive - chrono::Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}

fn offset_before_gap(naive: NaiveDateTime, tz: Tz) -> FixedOffset {
    (1..=MAX_GAP_HOURS)
        .find_map(|hours| {
            tz.from_local_datetime(&(naive - chrono::Duration::hours(hours)))
                .earliest()
                .map(|dt| dt.offset().fix())
        })
        .unwrap_or_else(|| tz.offset_from_utc_datetime(&naive).fix())
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

fn truncate_to_i64(value: f64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let truncated = value.trunc();
    if truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
        Some(truncated as i64)
    } else {
        None
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

//! Value coercion shared by all sensors
//!
//! Every helper answers `None` instead of failing: a malformed field makes
//! one sensor unknown and leaves the rest of the set alone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Numeric view of a JSON value; numeric strings count, booleans do not
pub fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Truthiness of a flag like `is_present`
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Round to `decimals` places against the exact decimal expansion of
/// `value`; `None` for non-finite input
pub fn round_to(value: f64, decimals: usize) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    format!("{:.*}", decimals, value)
        .parse::<f64>()
        .ok()
        .filter(|rounded| rounded.is_finite())
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 timestamp; values without an offset are taken as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Offset present but with a space separator instead of 'T'
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Hours elapsed since `since`, rounded to two decimals
pub fn age_hours(since: DateTime<Utc>, now: DateTime<Utc>) -> Option<f64> {
    let seconds = (now - since).num_milliseconds() as f64 / 1000.0;
    round_to(seconds / 3600.0, 2)
}

//! Lenient date parsing and canonical date formatting.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Years a date may fall in. RFC 3339 has exactly four year digits, so
/// anything outside would not read back after formatting.
const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

/// Parse a JSON value as a date.
///
/// Accepts RFC 3339 strings, naive `YYYY-MM-DD[THH:MM[:SS]]` strings (read
/// as UTC) and integer epoch milliseconds. Anything else, including dates
/// outside years 1 to 9999, is `None`.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .filter(representable),
        _ => None,
    }
}

pub fn parse_date_str(raw: &str) -> Option<DateTime<Utc>> {
    parse_any_form(raw).filter(representable)
}

pub(crate) fn representable(date: &DateTime<Utc>) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&date.year())
}

fn parse_any_form(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// The string form dates take in a serialized document
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

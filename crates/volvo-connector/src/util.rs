//! Small helpers shared by the mappers and the cache.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

/// Tracing target for payload-shape diagnostics.
pub const API_LOG_TARGET: &str = "volvo_connector::api";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse an ISO-8601 timestamp, tolerating missing offsets (treated as UTC)
/// and a space instead of `T`.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Log keys of `object` that the mapper does not know about.
pub fn log_extra_keys(context: &str, object: &Map<String, Value>, known: &[&str]) {
    let known: HashSet<&str> = known.iter().copied().collect();
    for key in object.keys().filter(|key| !known.contains(key.as_str())) {
        debug!(target: API_LOG_TARGET, context, key = %key, value = %object[key], "Unknown attribute in response");
    }
}

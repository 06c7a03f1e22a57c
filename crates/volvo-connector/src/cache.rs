//! URL-keyed response cache.
//!
//! Entries are never evicted. Freshness is judged at read time by comparing
//! the capture timestamp against a maximum age, so a stale entry simply gets
//! superseded by the next successful fetch.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::util::parse_timestamp;

/// A cached response payload and the moment it was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEntry", into = "RawEntry")]
pub struct CacheEntry {
    pub payload: Value,
    pub captured_at: DateTime<Utc>,
}

/// Persisted form: `[payload, "<ISO-8601 timestamp>"]`.
#[derive(Serialize, Deserialize)]
struct RawEntry(Value, String);

impl From<RawEntry> for CacheEntry {
    fn from(RawEntry(payload, captured_at): RawEntry) -> Self {
        // An unreadable timestamp makes the entry stale instead of failing the restore.
        let captured_at = parse_timestamp(&captured_at).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            payload,
            captured_at,
        }
    }
}

impl From<CacheEntry> for RawEntry {
    fn from(entry: CacheEntry) -> Self {
        RawEntry(entry.payload, entry.captured_at.to_rfc3339())
    }
}

impl CacheEntry {
    pub fn new(payload: Value, captured_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            captured_at,
        }
    }

    /// Fresh iff `now - captured_at < max_age`. `None` means never fresh.
    pub fn is_fresh(&self, max_age: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(max_age) = max_age else {
            return false;
        };
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(self.captured_at) < max_age
    }
}

/// Mapping from request URL to the last successful response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    /// Return the cached payload for `url` if it is still fresh at `now`.
    pub fn lookup_fresh(
        &self,
        url: &str,
        max_age: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Option<&Value> {
        self.entries
            .get(url)
            .filter(|entry| entry.is_fresh(max_age, now))
            .map(|entry| &entry.payload)
    }

    /// Store `payload` for `url`, superseding any previous entry.
    pub fn insert(&mut self, url: impl Into<String>, payload: Value, now: DateTime<Utc>) {
        self.entries.insert(url.into(), CacheEntry::new(payload, now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize into the opaque blob handed to the host cache store.
    pub fn to_blob(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()))
    }

    /// Rebuild from a blob produced by [`ResponseCache::to_blob`].
    ///
    /// Malformed entries are skipped so one bad record does not discard the
    /// whole cache.
    pub fn from_blob(blob: Value) -> Self {
        let Value::Object(map) = blob else {
            warn!("Ignoring persisted response cache: not a JSON object");
            return Self::default();
        };

        let mut entries = HashMap::with_capacity(map.len());
        for (url, raw) in map {
            match serde_json::from_value::<CacheEntry>(raw) {
                Ok(entry) => {
                    entries.insert(url, entry);
                }
                Err(e) => warn!(url = %url, error = %e, "Skipping malformed cache entry"),
            }
        }
        Self { entries }
    }
}

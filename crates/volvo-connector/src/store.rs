//! Persistence abstraction for tokens and response caches.
//!
//! The host owns the storage. The connector only loads a session's state when
//! the session is created and writes it back when asked to persist.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::Result;

/// Persisted authentication state of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the token stored under `identifier`, if any.
    async fn load_token(&self, identifier: &str) -> Result<Option<StoredToken>>;

    /// Store `token` under `identifier`, replacing any previous value.
    async fn save_token(&self, identifier: &str, token: &StoredToken) -> Result<()>;
}

#[async_trait]
pub trait ResponseCacheStore: Send + Sync {
    /// Load the opaque cache blob stored under `identifier`, if any.
    async fn load_cache(&self, identifier: &str) -> Result<Option<Value>>;

    /// Store `blob` under `identifier`, replacing any previous value.
    async fn save_cache(&self, identifier: &str, blob: &Value) -> Result<()>;
}

/// In-process store, mostly for tests and short-lived hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tokens: Mutex<HashMap<String, StoredToken>>,
    caches: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn cache_count(&self) -> usize {
        self.caches.lock().len()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn load_token(&self, identifier: &str) -> Result<Option<StoredToken>> {
        Ok(self.tokens.lock().get(identifier).cloned())
    }

    async fn save_token(&self, identifier: &str, token: &StoredToken) -> Result<()> {
        self.tokens
            .lock()
            .insert(identifier.to_string(), token.clone());
        Ok(())
    }
}

#[async_trait]
impl ResponseCacheStore for MemoryStore {
    async fn load_cache(&self, identifier: &str) -> Result<Option<Value>> {
        Ok(self.caches.lock().get(identifier).cloned())
    }

    async fn save_cache(&self, identifier: &str, blob: &Value) -> Result<()> {
        self.caches
            .lock()
            .insert(identifier.to_string(), blob.clone());
        Ok(())
    }
}

const TOKENS_SECTION: &str = "tokens";
const CACHE_SECTION: &str = "cache";

/// Single JSON document on disk with a `tokens` and a `cache` section.
///
/// Writes go to a sibling temp file which is then renamed over the target.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => {
                warn!(path = %self.path.display(), "State file is not a JSON object, starting cold");
                Ok(Map::new())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "State file is corrupt, starting cold");
                Ok(Map::new())
            }
        }
    }

    async fn read_entry(&self, section: &str, identifier: &str) -> Result<Option<Value>> {
        let document = self.read_document().await?;
        Ok(document
            .get(section)
            .and_then(|s| s.get(identifier))
            .cloned())
    }

    async fn write_entry(&self, section: &str, identifier: &str, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        let section = document
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match section {
            Value::Object(entries) => {
                entries.insert(identifier.to_string(), value);
            }
            other => {
                let mut entries = Map::new();
                entries.insert(identifier.to_string(), value);
                *other = Value::Object(entries);
            }
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(document))?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), "Persisted connector state");
        Ok(())
    }
}

#[async_trait]
impl TokenStore for JsonFileStore {
    async fn load_token(&self, identifier: &str) -> Result<Option<StoredToken>> {
        match self.read_entry(TOKENS_SECTION, identifier).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(token) => Ok(Some(token)),
                Err(e) => {
                    warn!(identifier, error = %e, "Ignoring malformed stored token");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn save_token(&self, identifier: &str, token: &StoredToken) -> Result<()> {
        self.write_entry(TOKENS_SECTION, identifier, serde_json::to_value(token)?)
            .await
    }
}

#[async_trait]
impl ResponseCacheStore for JsonFileStore {
    async fn load_cache(&self, identifier: &str) -> Result<Option<Value>> {
        self.read_entry(CACHE_SECTION, identifier).await
    }

    async fn save_cache(&self, identifier: &str, blob: &Value) -> Result<()> {
        self.write_entry(CACHE_SECTION, identifier, blob.clone())
            .await
    }
}

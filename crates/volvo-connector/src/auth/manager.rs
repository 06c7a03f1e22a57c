//! Session registry.
//!
//! Maps (service, credential) pairs to live sessions and keeps their token and
//! response cache in sync with the host stores.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::credential::{Service, SessionToken, generate_identifier};
use super::session::{Session, SessionOptions};
use crate::cache::ResponseCache;
use crate::error::{ConnectorError, Result};
use crate::store::{ResponseCacheStore, StoredToken, TokenStore};
use crate::transport::HttpTransport;

struct ManagedSession {
    identifier: String,
    session: Arc<Session>,
}

/// Creates sessions lazily and reuses them for identical credentials.
pub struct SessionManager {
    token_store: Arc<dyn TokenStore>,
    cache_store: Arc<dyn ResponseCacheStore>,
    transport: Arc<dyn HttpTransport>,
    options: SessionOptions,
    sessions: HashMap<(Service, SessionToken), ManagedSession>,
}

impl SessionManager {
    pub fn new(
        token_store: Arc<dyn TokenStore>,
        cache_store: Arc<dyn ResponseCacheStore>,
        transport: Arc<dyn HttpTransport>,
        options: SessionOptions,
    ) -> Self {
        Self {
            token_store,
            cache_store,
            transport,
            options,
            sessions: HashMap::new(),
        }
    }

    fn is_supported(service: Service) -> bool {
        matches!(service, Service::ConnectedVehicle | Service::Location)
    }

    /// Return the session for `service` and `credential`, creating it on first use.
    pub async fn get_session(
        &mut self,
        service: Service,
        credential: &SessionToken,
    ) -> Result<Arc<Session>> {
        if !Self::is_supported(service) {
            return Err(ConnectorError::UnsupportedService(service));
        }

        let key = (service, credential.clone());
        if let Some(managed) = self.sessions.get(&key) {
            return Ok(managed.session.clone());
        }

        let identifier = generate_identifier(service, credential);
        let stored = self.token_store.load_token(&identifier).await?;
        let cache = match self.cache_store.load_cache(&identifier).await? {
            Some(blob) => ResponseCache::from_blob(blob),
            None => ResponseCache::new(),
        };

        let (token, metadata) = match stored {
            Some(StoredToken {
                token: Some(token),
                metadata,
            }) if !token.is_empty() => {
                info!(%service, "Reusing token from previous session");
                (token, metadata)
            }
            Some(StoredToken { metadata, .. }) => {
                (credential.access_token().to_string(), metadata)
            }
            None => (
                credential.access_token().to_string(),
                Value::Object(Default::default()),
            ),
        };
        let token = (!token.is_empty()).then_some(token);

        debug!(%service, cached_urls = cache.len(), "Creating session");
        let session = Arc::new(Session::new(
            service,
            credential.clone(),
            self.transport.clone(),
            self.options.clone(),
            token,
            metadata,
            cache,
        )?);

        self.sessions.insert(
            key,
            ManagedSession {
                identifier,
                session: session.clone(),
            },
        );
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session. Persisted state stays in memory until [`persist`](Self::persist).
    pub fn close_all(&self) {
        for managed in self.sessions.values() {
            managed.session.close();
        }
    }

    /// Write every session's token, metadata and response cache back to the stores.
    ///
    /// All sessions are attempted; the first failure is returned.
    pub async fn persist(&self) -> Result<()> {
        let mut first_error = None;

        for managed in self.sessions.values() {
            let session = &managed.session;
            let stored = StoredToken {
                token: session.token(),
                metadata: session.metadata(),
            };
            let blob = session.with_cache(|cache| cache.to_blob());

            if let Err(e) = self.token_store.save_token(&managed.identifier, &stored).await {
                warn!(service = %session.service(), error = %e, "Failed to persist token");
                first_error.get_or_insert(e);
            }
            if let Err(e) = self.cache_store.save_cache(&managed.identifier, &blob).await {
                warn!(service = %session.service(), error = %e, "Failed to persist response cache");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(sessions = self.sessions.len(), "Persisted sessions");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_utils::ScriptedTransport;
    use chrono::Utc;
    use serde_json::json;

    fn manager(store: Arc<MemoryStore>) -> SessionManager {
        SessionManager::new(
            store.clone(),
            store,
            Arc::new(ScriptedTransport::new()),
            SessionOptions::default(),
        )
    }

    fn credential() -> SessionToken {
        SessionToken::new("primary", "secondary", "configured")
    }

    #[tokio::test]
    async fn identical_credentials_share_one_session() {
        let mut manager = manager(Arc::new(MemoryStore::new()));

        let a = manager.get_session(Service::ConnectedVehicle, &credential()).await.unwrap();
        let b = manager.get_session(Service::ConnectedVehicle, &credential()).await.unwrap();
        let c = manager.get_session(Service::Location, &credential()).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn energy_service_is_rejected() {
        let mut manager = manager(Arc::new(MemoryStore::new()));
        let err = manager.get_session(Service::Energy, &credential()).await.unwrap_err();
        assert!(matches!(err, ConnectorError::UnsupportedService(Service::Energy)));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn seeds_from_persisted_token() {
        let store = Arc::new(MemoryStore::new());
        let identifier = generate_identifier(Service::ConnectedVehicle, &credential());
        store
            .save_token(
                &identifier,
                &StoredToken {
                    token: Some("persisted".to_string()),
                    metadata: json!({"k": 1}),
                },
            )
            .await
            .unwrap();

        let mut manager = manager(store);
        let session = manager.get_session(Service::ConnectedVehicle, &credential()).await.unwrap();

        assert_eq!(session.token().as_deref(), Some("persisted"));
        assert_eq!(session.metadata(), json!({"k": 1}));
    }

    #[tokio::test]
    async fn falls_back_to_configured_token() {
        let mut manager = manager(Arc::new(MemoryStore::new()));
        let session = manager.get_session(Service::ConnectedVehicle, &credential()).await.unwrap();
        assert_eq!(session.token().as_deref(), Some("configured"));
    }

    #[tokio::test]
    async fn persist_writes_token_and_cache_under_identifier() {
        let store = Arc::new(MemoryStore::new());
        let mut manager = manager(store.clone());
        let session = manager.get_session(Service::ConnectedVehicle, &credential()).await.unwrap();
        session.with_cache(|cache| cache.insert("https://a", json!({"data": 1}), Utc::now()));

        manager.persist().await.unwrap();

        let identifier = generate_identifier(Service::ConnectedVehicle, &credential());
        let token = store.load_token(&identifier).await.unwrap().unwrap();
        assert_eq!(token.token.as_deref(), Some("configured"));
        let blob = store.load_cache(&identifier).await.unwrap().unwrap();
        assert_eq!(ResponseCache::from_blob(blob).len(), 1);
    }

    #[tokio::test]
    async fn close_all_closes_every_session() {
        let mut manager = manager(Arc::new(MemoryStore::new()));
        let a = manager.get_session(Service::ConnectedVehicle, &credential()).await.unwrap();
        let b = manager.get_session(Service::Location, &credential()).await.unwrap();

        manager.close_all();
        assert!(a.is_closed() && b.is_closed());
    }
}

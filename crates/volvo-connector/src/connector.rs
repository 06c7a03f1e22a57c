//! Connector lifecycle: construction, startup and shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::VolvoApi;
use crate::auth::{Service, SessionManager};
use crate::config::{ConnectorConfig, MIN_INTERVAL};
use crate::error::{ConnectorError, Result};
use crate::fetch::{Fetcher, RequestStats};
use crate::model::Garage;
use crate::poll::{ConnectionState, ConnectorStatus, PollLoop};
use crate::store::{ResponseCacheStore, TokenStore};
use crate::transport::HttpTransport;

/// Collaborators supplied by the hosting application.
#[derive(Clone)]
pub struct ConnectorHost {
    pub garage: Arc<dyn Garage>,
    pub token_store: Arc<dyn TokenStore>,
    pub cache_store: Arc<dyn ResponseCacheStore>,
    pub transport: Arc<dyn HttpTransport>,
}

/// One Volvo account polled by one background worker.
pub struct Connector {
    id: String,
    config: ConnectorConfig,
    garage: Arc<dyn Garage>,
    manager: SessionManager,
    fetcher: Arc<Fetcher>,
    api: Arc<VolvoApi>,
    status: Arc<ConnectorStatus>,
    cancellation_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Connector {
    /// Validate `config` and create the sessions. Nothing is started yet.
    pub async fn new(id: impl Into<String>, config: ConnectorConfig, host: ConnectorHost) -> Result<Self> {
        let id = id.into();
        info!(connector = %id, config = %config.redacted(), "Loading Volvo connector");
        config.validate()?;

        let mut manager = SessionManager::new(
            host.token_store,
            host.cache_store,
            host.transport,
            config.session_options(),
        );
        let connected_vehicle = manager
            .get_session(Service::ConnectedVehicle, &config.connected_vehicle_credential()?)
            .await?;
        let location = manager
            .get_session(Service::Location, &config.location_credential()?)
            .await?;

        let status = Arc::new(ConnectorStatus::new(Some(config.interval())));
        let fetcher = Arc::new(Fetcher::for_interval(
            config.max_age,
            status.subscribe_interval(),
        ));
        let api = Arc::new(VolvoApi::new(
            id.clone(),
            host.garage.clone(),
            fetcher.clone(),
            connected_vehicle,
            location,
            config.hide_vins.iter().cloned(),
        ));

        Ok(Self {
            status,
            id,
            config,
            garage: host.garage,
            manager,
            fetcher,
            api,
            cancellation_token: CancellationToken::new(),
            worker: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Spawn the background worker. Calling it twice is a no-op.
    pub fn startup(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            warn!(connector = %self.id, "Connector already started");
            return;
        }

        let poll_loop = PollLoop::new(
            self.api.clone(),
            self.status.clone(),
            self.cancellation_token.clone(),
        );
        // the worker may report a fatal error before spawn returns
        self.status.set_healthy(true);
        *worker = Some(tokio::spawn(poll_loop.run()));
        info!(connector = %self.id, "Connector started");
    }

    /// Stop the worker and persist all sessions.
    ///
    /// Vehicles managed only by this connector are removed from the garage and
    /// marked inactive. A fatal worker error is returned after persisting.
    pub async fn shutdown(&self) -> Result<()> {
        for vin in self.garage.list_vins() {
            let Some(vehicle) = self.garage.get_vehicle(&vin) else {
                continue;
            };
            let solely_managed = vehicle.read().is_solely_managed_by(&self.id);
            if solely_managed {
                self.garage.remove_vehicle(&vin);
                vehicle.read().is_active.set_value(false);
                debug!(vin = %vin, "Removed vehicle on shutdown");
            }
        }

        self.cancellation_token.cancel();
        self.manager.close_all();

        let handle = self.worker.lock().take();
        let worker_result = match handle {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(ConnectorError::Internal(format!("poll worker panicked: {e}"))),
            },
            None => Ok(()),
        };

        let persisted = self.persist().await;
        info!(connector = %self.id, "Connector stopped");
        worker_result.and(persisted)
    }

    /// Write tokens and response caches to the host stores.
    pub async fn persist(&self) -> Result<()> {
        self.manager.persist().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.status.state()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe_state()
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    pub fn subscribe_healthy(&self) -> watch::Receiver<bool> {
        self.status.subscribe_healthy()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.status.last_update()
    }

    pub fn subscribe_last_update(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.status.subscribe_last_update()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.status.interval()
    }

    /// Change the poll interval. Takes effect after the current sleep.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval < MIN_INTERVAL {
            return Err(ConnectorError::config(format!(
                "interval must be at least {} seconds",
                MIN_INTERVAL.as_secs()
            )));
        }
        self.status.set_interval(Some(interval));
        Ok(())
    }

    pub fn request_stats(&self) -> RequestStats {
        self.fetcher.stats()
    }

    pub fn sessions(&self) -> usize {
        self.manager.len()
    }
}

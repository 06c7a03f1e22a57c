//! Background poll loop and the observables it drives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumString};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{ConnectorError, CooldownClass, Result};

/// Cool-down after the provider reported too many requests.
pub const QUOTA_COOLDOWN: Duration = Duration::from_secs(900);

/// Sleep used while no interval is known.
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(300);

/// Connection state as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Work performed by one loop iteration.
#[async_trait]
pub trait PollCycle: Send + Sync {
    /// Enumerate vehicles, reconcile local records, then refresh every field.
    async fn full_resync(&self) -> Result<()>;

    /// Refresh every field of the known vehicles.
    async fn refresh(&self) -> Result<()>;
}

/// How long to wait after `err` before the next cycle. `None` means the loop must stop.
pub fn cooldown_for(err: &ConnectorError, interval: Option<Duration>) -> Option<Duration> {
    match err.cooldown_class() {
        CooldownClass::Quota => Some(QUOTA_COOLDOWN),
        CooldownClass::Interval => Some(interval.unwrap_or(FALLBACK_INTERVAL)),
        CooldownClass::Fatal => None,
    }
}

/// Observables published by the connector.
///
/// The poll loop is the only writer of the state, healthy and last-update
/// values. The interval may also be changed by the host.
#[derive(Debug)]
pub struct ConnectorStatus {
    state: watch::Sender<ConnectionState>,
    healthy: watch::Sender<bool>,
    last_update: watch::Sender<Option<DateTime<Utc>>>,
    interval: watch::Sender<Option<Duration>>,
}

impl ConnectorStatus {
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            state: watch::Sender::new(ConnectionState::Disconnected),
            healthy: watch::Sender::new(false),
            last_update: watch::Sender::new(None),
            interval: watch::Sender::new(interval),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_healthy(&self) -> bool {
        *self.healthy.borrow()
    }

    pub fn subscribe_healthy(&self) -> watch::Receiver<bool> {
        self.healthy.subscribe()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.borrow()
    }

    pub fn subscribe_last_update(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_update.subscribe()
    }

    pub fn interval(&self) -> Option<Duration> {
        *self.interval.borrow()
    }

    pub fn subscribe_interval(&self) -> watch::Receiver<Option<Duration>> {
        self.interval.subscribe()
    }

    pub fn set_interval(&self, interval: Option<Duration>) {
        self.interval.send_replace(interval);
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    pub(crate) fn set_healthy(&self, healthy: bool) {
        self.healthy.send_if_modified(|current| {
            let changed = *current != healthy;
            *current = healthy;
            changed
        });
    }

    fn mark_success(&self, at: DateTime<Utc>) {
        self.last_update.send_replace(Some(at));
        self.set_state(ConnectionState::Connected);
    }
}

/// Single worker that runs poll cycles until cancelled.
pub struct PollLoop {
    cycle: Arc<dyn PollCycle>,
    status: Arc<ConnectorStatus>,
    cancellation_token: CancellationToken,
}

impl PollLoop {
    pub fn new(
        cycle: Arc<dyn PollCycle>,
        status: Arc<ConnectorStatus>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            cycle,
            status,
            cancellation_token,
        }
    }

    /// Run until cancelled (`Ok`) or until an unclassified failure (`Err`).
    ///
    /// The full resync repeats until it has succeeded once; afterwards only
    /// refreshes run. Cancellation is observed between cycles and during the
    /// sleep, never in the middle of a request.
    pub async fn run(self) -> Result<()> {
        self.status.set_state(ConnectionState::Connecting);
        let mut needs_resync = true;

        while !self.cancellation_token.is_cancelled() {
            let outcome = if needs_resync {
                self.cycle.full_resync().await
            } else {
                self.cycle.refresh().await
            };
            let interval = self.status.interval();

            let delay = match outcome {
                Ok(()) => {
                    needs_resync = false;
                    self.status.mark_success(Utc::now());
                    interval.unwrap_or(FALLBACK_INTERVAL)
                }
                Err(ConnectorError::SessionClosed) if self.cancellation_token.is_cancelled() => {
                    debug!("Sessions closed by shutdown, stopping");
                    break;
                }
                Err(err) => {
                    self.status.set_state(ConnectionState::Error);
                    match cooldown_for(&err, interval) {
                        Some(delay) => {
                            if matches!(err.cooldown_class(), CooldownClass::Quota) {
                                error!(
                                    error = %err,
                                    "Too many requests from this account, trying again after {}s",
                                    delay.as_secs()
                                );
                            } else {
                                error!(
                                    error = %err,
                                    "Update failed, trying again after {}s",
                                    delay.as_secs()
                                );
                            }
                            delay
                        }
                        None => {
                            error!(error = %err, "Critical error during update, stopping worker");
                            self.status.set_healthy(false);
                            return Err(err);
                        }
                    }
                }
            };

            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    debug!("Poll loop sleep interrupted");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Poll loop stopped");
        self.status.set_state(ConnectionState::Disconnected);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::logs::LogCapture;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tracing::Level;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Resync,
        Refresh,
    }

    #[derive(Default)]
    struct ScriptedCycle {
        outcomes: Mutex<VecDeque<Result<()>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedCycle {
        fn with(outcomes: Vec<Result<()>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn next(&self, call: Call) -> Result<()> {
            self.calls.lock().push(call);
            self.outcomes.lock().pop_front().unwrap_or(Ok(()))
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl PollCycle for ScriptedCycle {
        async fn full_resync(&self) -> Result<()> {
            self.next(Call::Resync)
        }

        async fn refresh(&self) -> Result<()> {
            self.next(Call::Refresh)
        }
    }

    fn quota() -> ConnectorError {
        ConnectorError::QuotaExceeded {
            url: "https://api.volvocars.com/x".to_string(),
            status: reqwest::StatusCode::TOO_MANY_REQUESTS,
        }
    }

    #[test]
    fn cooldown_selection() {
        let interval = Some(Duration::from_secs(180));
        assert_eq!(cooldown_for(&quota(), interval), Some(QUOTA_COOLDOWN));
        assert_eq!(
            cooldown_for(&ConnectorError::retrieval("https://a", "down"), interval),
            interval
        );
        assert_eq!(
            cooldown_for(&ConnectorError::api_compatibility("no vin"), None),
            Some(FALLBACK_INTERVAL)
        );
        assert_eq!(cooldown_for(&ConnectorError::Internal("bug".into()), interval), None);
    }

    #[tokio::test(start_paused = true)]
    async fn resync_once_then_refresh() {
        let cycle = ScriptedCycle::with(vec![]);
        let status = Arc::new(ConnectorStatus::new(Some(Duration::from_secs(60))));
        let token = CancellationToken::new();
        let mut states = status.subscribe_state();

        let handle = tokio::spawn(PollLoop::new(cycle.clone(), status.clone(), token.clone()).run());

        states.changed().await.unwrap();
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(status.state(), ConnectionState::Connected);
        assert!(status.last_update().is_some());

        token.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(cycle.calls(), vec![Call::Resync, Call::Refresh, Call::Refresh]);
        assert_eq!(status.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_waits_fifteen_minutes_regardless_of_interval() {
        let cycle = ScriptedCycle::with(vec![Err(quota())]);
        let status = Arc::new(ConnectorStatus::new(Some(Duration::from_secs(60))));
        let token = CancellationToken::new();

        let handle = tokio::spawn(PollLoop::new(cycle.clone(), status.clone(), token.clone()).run());

        tokio::time::sleep(Duration::from_secs(899)).await;
        assert_eq!(cycle.calls(), vec![Call::Resync]);
        assert_eq!(status.state(), ConnectionState::Error);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cycle.calls(), vec![Call::Resync, Call::Resync]);
        assert_eq!(status.state(), ConnectionState::Connected);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn retrieval_failure_waits_the_interval_and_retries_resync() {
        let cycle = ScriptedCycle::with(vec![Err(ConnectorError::retrieval("https://a", "down"))]);
        let status = Arc::new(ConnectorStatus::new(Some(Duration::from_secs(120))));
        let token = CancellationToken::new();

        let handle = tokio::spawn(PollLoop::new(cycle.clone(), status.clone(), token.clone()).run());

        tokio::time::sleep(Duration::from_secs(119)).await;
        assert_eq!(cycle.calls(), vec![Call::Resync]);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cycle.calls(), vec![Call::Resync, Call::Resync]);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unclassified_failure_stops_and_marks_unhealthy() {
        let cycle = ScriptedCycle::with(vec![Err(ConnectorError::Internal("bug".into()))]);
        let status = Arc::new(ConnectorStatus::new(Some(Duration::from_secs(60))));
        status.set_healthy(true);

        let result = PollLoop::new(cycle.clone(), status.clone(), CancellationToken::new())
            .run()
            .await;

        assert!(matches!(result, Err(ConnectorError::Internal(_))));
        assert!(!status.is_healthy());
        assert_eq!(status.state(), ConnectionState::Error);
        assert_eq!(cycle.calls(), vec![Call::Resync]);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_change_applies_to_next_sleep() {
        let cycle = ScriptedCycle::with(vec![]);
        let status = Arc::new(ConnectorStatus::new(Some(Duration::from_secs(600))));
        status.set_interval(Some(Duration::from_secs(60)));
        let token = CancellationToken::new();

        let handle = tokio::spawn(PollLoop::new(cycle.clone(), status.clone(), token.clone()).run());
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cycle.calls().len(), 2);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    /// Shuts the connector down while a cycle is in flight.
    struct ClosedMidCycle(CancellationToken);

    #[async_trait]
    impl PollCycle for ClosedMidCycle {
        async fn full_resync(&self) -> Result<()> {
            self.0.cancel();
            Err(ConnectorError::SessionClosed)
        }

        async fn refresh(&self) -> Result<()> {
            self.full_resync().await
        }
    }

    #[tokio::test]
    async fn session_closed_by_shutdown_stops_quietly() {
        let (logs, _guard) = LogCapture::install();
        let token = CancellationToken::new();
        let status = Arc::new(ConnectorStatus::new(Some(Duration::from_secs(60))));
        status.set_healthy(true);

        PollLoop::new(Arc::new(ClosedMidCycle(token.clone())), status.clone(), token)
            .run()
            .await
            .unwrap();

        assert_eq!(status.state(), ConnectionState::Disconnected);
        assert!(status.is_healthy());
        assert!(!logs.any_at(Level::ERROR));
    }

    #[tokio::test(start_paused = true)]
    async fn session_closed_without_shutdown_is_retried() {
        let cycle = ScriptedCycle::with(vec![Err(ConnectorError::SessionClosed)]);
        let status = Arc::new(ConnectorStatus::new(Some(Duration::from_secs(60))));
        let token = CancellationToken::new();

        let handle = tokio::spawn(PollLoop::new(cycle.clone(), status.clone(), token.clone()).run());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(status.state(), ConnectionState::Error);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(cycle.calls(), vec![Call::Resync, Call::Resync]);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancelled_before_start_exits_without_polling() {
        let cycle = ScriptedCycle::with(vec![]);
        let status = Arc::new(ConnectorStatus::new(None));
        let token = CancellationToken::new();
        token.cancel();

        PollLoop::new(cycle.clone(), status.clone(), token).run().await.unwrap();
        assert!(cycle.calls().is_empty());
        assert_eq!(status.state(), ConnectionState::Disconnected);
    }
}

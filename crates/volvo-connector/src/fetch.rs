//! Cache-aware fetching.
//!
//! [`Fetcher::fetch_data`] is the only way network data enters the connector:
//! it consults the session's response cache, performs the GET, classifies the
//! status into typed errors, re-authenticates once on 401 and writes
//! successful payloads back to the cache.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::auth::Session;
use crate::config::MaxAge;
use crate::error::{ConnectorError, Result};
use crate::transport::HttpResponse;

/// Per-call behaviour of [`Fetcher::fetch_data`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Skip the cache lookup.
    pub force: bool,
    /// Treat 204 and undecodable bodies as "no data".
    pub allow_empty: bool,
    /// Treat the statuses in `allowed_errors` as "no data".
    pub allow_http_error: bool,
    pub allowed_errors: Vec<StatusCode>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    /// Tolerate the given statuses. An empty list tolerates nothing.
    pub fn allow_errors(mut self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        self.allow_http_error = true;
        self.allowed_errors.extend(statuses);
        self
    }

    fn tolerates(&self, status: StatusCode) -> bool {
        self.allow_http_error && self.allowed_errors.contains(&status)
    }
}

/// Latency and outcome counters for requests that reached the network.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestStats {
    pub requests: u64,
    pub cache_hits: u64,
    pub failures: u64,
    #[serde(with = "duration_ms")]
    pub last_latency: Duration,
    #[serde(with = "duration_ms")]
    pub max_latency: Duration,
    #[serde(with = "duration_ms")]
    pub total_latency: Duration,
}

impl RequestStats {
    pub fn mean_latency(&self) -> Option<Duration> {
        u32::try_from(self.requests)
            .ok()
            .filter(|n| *n > 0)
            .map(|n| self.total_latency / n)
    }

    fn record(&mut self, latency: Duration) {
        self.requests += 1;
        self.last_latency = latency;
        self.max_latency = self.max_latency.max(latency);
        self.total_latency += latency;
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}

enum Outcome {
    Data(Option<Value>),
    Unauthorized,
}

/// How long a cached response stays fresh.
#[derive(Debug)]
enum Freshness {
    Fixed(Option<Duration>),
    /// One second less than the current poll interval.
    Interval(watch::Receiver<Option<Duration>>),
}

/// Fetch primitive shared by every field refresher.
#[derive(Debug)]
pub struct Fetcher {
    freshness: Freshness,
    /// Wall clock at construction, advanced by the monotonic clock.
    epoch: (DateTime<Utc>, Instant),
    stats: Mutex<RequestStats>,
}

impl Fetcher {
    /// `max_age` of `None` disables the cache for reads.
    pub fn new(max_age: Option<Duration>) -> Self {
        Self::with_freshness(Freshness::Fixed(max_age))
    }

    /// Resolve `max_age` against the live poll `interval`.
    ///
    /// [`MaxAge::Default`] follows every interval change.
    pub fn for_interval(max_age: MaxAge, interval: watch::Receiver<Option<Duration>>) -> Self {
        Self::with_freshness(match max_age {
            MaxAge::Default => Freshness::Interval(interval),
            MaxAge::Seconds(secs) => Freshness::Fixed(Some(Duration::from_secs(secs))),
            MaxAge::Never => Freshness::Fixed(None),
        })
    }

    fn with_freshness(freshness: Freshness) -> Self {
        Self {
            freshness,
            epoch: (Utc::now(), Instant::now()),
            stats: Mutex::new(RequestStats::default()),
        }
    }

    pub fn max_age(&self) -> Option<Duration> {
        match &self.freshness {
            Freshness::Fixed(max_age) => *max_age,
            Freshness::Interval(interval) => (*interval.borrow())
                .map(|interval| interval.saturating_sub(Duration::from_secs(1))),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let (wall, started) = self.epoch;
        wall + TimeDelta::from_std(started.elapsed()).unwrap_or(TimeDelta::zero())
    }

    pub fn stats(&self) -> RequestStats {
        self.stats.lock().clone()
    }

    /// Fetch `url` through `session`.
    ///
    /// Returns `Ok(None)` for "no data": an allowed empty response or a
    /// tolerated HTTP error.
    pub async fn fetch_data(
        &self,
        url: &str,
        session: &Session,
        options: &FetchOptions,
    ) -> Result<Option<Value>> {
        if !options.force {
            let cached = session.with_cache(|cache| {
                cache
                    .lookup_fresh(url, self.max_age(), self.now())
                    .cloned()
            });
            if let Some(payload) = cached {
                trace!(url, "Serving response from cache");
                self.stats.lock().cache_hits += 1;
                return Ok(Some(payload));
            }
        }

        let response = self.send(url, session).await?;
        match self.evaluate(url, session, response, options, false)? {
            Outcome::Data(data) => Ok(data),
            Outcome::Unauthorized => {
                info!(url, "Server asks for new authorization");
                session.login()?;

                let response = self.send(url, session).await?;
                match self.evaluate(url, session, response, options, true)? {
                    Outcome::Data(data) => Ok(data),
                    // evaluate only reports 401 on the first attempt
                    Outcome::Unauthorized => Err(ConnectorError::status(
                        url,
                        StatusCode::UNAUTHORIZED,
                        "unauthorized even after re-authorization",
                    )),
                }
            }
        }
    }

    async fn send(&self, url: &str, session: &Session) -> Result<HttpResponse> {
        let started = Instant::now();
        let result = session.get(url).await;
        let latency = started.elapsed();

        let mut stats = self.stats.lock();
        stats.record(latency);
        if result.is_err() {
            stats.failures += 1;
        }
        drop(stats);

        trace!(url, latency_ms = latency.as_millis() as u64, "Request finished");
        result
    }

    fn evaluate(
        &self,
        url: &str,
        session: &Session,
        response: HttpResponse,
        options: &FetchOptions,
        reauthorized: bool,
    ) -> Result<Outcome> {
        let status = response.status;
        let suffix = if reauthorized {
            " even after re-authorization"
        } else {
            ""
        };

        match status {
            StatusCode::OK | StatusCode::MULTI_STATUS => match response.json() {
                Ok(payload) => {
                    session.with_cache(|cache| cache.insert(url, payload.clone(), self.now()));
                    Ok(Outcome::Data(Some(payload)))
                }
                Err(e) if options.allow_empty => {
                    debug!(url, error = %e, "Undecodable response treated as empty");
                    Ok(Outcome::Data(None))
                }
                Err(e) => {
                    self.stats.lock().failures += 1;
                    Err(ConnectorError::status(
                        url,
                        status,
                        format!("invalid JSON in response{suffix}: {e}"),
                    ))
                }
            },
            StatusCode::NO_CONTENT if options.allow_empty => Ok(Outcome::Data(None)),
            StatusCode::TOO_MANY_REQUESTS => {
                self.stats.lock().failures += 1;
                Err(ConnectorError::QuotaExceeded {
                    url: url.to_string(),
                    status,
                })
            }
            StatusCode::UNAUTHORIZED if !reauthorized => Ok(Outcome::Unauthorized),
            status if options.tolerates(status) => {
                debug!(url, %status, "Tolerated HTTP error treated as no data");
                Ok(Outcome::Data(None))
            }
            status => {
                self.stats.lock().failures += 1;
                warn!(url, %status, reauthorized, "Unexpected response status");
                Err(ConnectorError::status(
                    url,
                    status,
                    format!("unexpected status code {}{suffix}", status.as_u16()),
                ))
            }
        }
    }
}

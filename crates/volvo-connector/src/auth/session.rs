//! Authenticated session for one Volvo API service.
//!
//! A [`Session`] composes an [`HttpTransport`] with the account's bearer
//! token, the fixed `vcc-api-key` header and a status-driven retry policy.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rand::RngExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::credential::{Service, SessionToken};
use crate::cache::ResponseCache;
use crate::error::{ConnectorError, Result};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Header carrying the application key on every request.
pub const VCC_API_KEY_HEADER: &str = "vcc-api-key";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Status-driven retry behaviour of a session.
///
/// Statuses in `status_forcelist` are retried with exponential backoff, unless
/// they are also in `status_blacklist`. Blacklisted statuses always go back to
/// the caller untouched.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff_factor * 2^(n-1)`.
    pub backoff_factor: Duration,
    /// Hard cap on the computed delay.
    pub max_backoff: Duration,
    pub status_forcelist: Vec<StatusCode>,
    pub status_blacklist: Vec<StatusCode>,
    /// Adds up to half of `backoff_factor` of random jitter.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_factor: Duration::from_millis(100),
            max_backoff: Duration::from_secs(120),
            status_forcelist: vec![StatusCode::INTERNAL_SERVER_ERROR],
            status_blacklist: vec![StatusCode::TOO_MANY_REQUESTS],
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Whether a response with `status` may be retried at all.
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.is_enabled()
            && self.status_forcelist.contains(&status)
            && !self.status_blacklist.contains(&status)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        let delay = self
            .backoff_factor
            .checked_mul(multiplier)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff);

        if !self.jitter {
            return delay;
        }

        let jitter_range_ms = u64::try_from(self.backoff_factor.as_millis()).unwrap_or(u64::MAX) / 2;
        if jitter_range_ms == 0 {
            return delay;
        }
        let jitter_ms = rand::rng().random_range(0..jitter_range_ms);
        (delay + Duration::from_millis(jitter_ms)).min(self.max_backoff)
    }
}

/// Settings applied to every session a registry creates.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Per-request overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Use this token instead of the session's own.
    pub token: Option<String>,
    pub timeout: Option<Duration>,
}

pub struct Session {
    service: Service,
    credential: SessionToken,
    transport: Arc<dyn HttpTransport>,
    default_headers: HeaderMap,
    options: SessionOptions,
    token: RwLock<Option<String>>,
    metadata: Mutex<Value>,
    cache: Mutex<ResponseCache>,
    closed: AtomicBool,
    login_attempts: AtomicU32,
}

impl Session {
    /// Build a session. `token` is the initial bearer token (usually the one
    /// restored from the token store, otherwise the credential's own).
    pub fn new(
        service: Service,
        credential: SessionToken,
        transport: Arc<dyn HttpTransport>,
        options: SessionOptions,
        token: Option<String>,
        metadata: Value,
        cache: ResponseCache,
    ) -> Result<Self> {
        let api_key = HeaderValue::from_str(credential.vcc_api_key_primary())
            .map_err(|_| ConnectorError::config("vcc_api_key_primary is not a valid header value"))?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(HeaderName::from_static(VCC_API_KEY_HEADER), api_key);
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            service,
            credential,
            transport,
            default_headers,
            options,
            token: RwLock::new(token),
            metadata: Mutex::new(metadata),
            cache: Mutex::new(cache),
            closed: AtomicBool::new(false),
            login_attempts: AtomicU32::new(0),
        })
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    pub fn metadata(&self) -> Value {
        self.metadata.lock().clone()
    }

    pub fn set_metadata(&self, metadata: Value) {
        *self.metadata.lock() = metadata;
    }

    /// Run `f` with exclusive access to the response cache.
    ///
    /// The lock is released before this returns; never hold it across an await.
    pub fn with_cache<R>(&self, f: impl FnOnce(&mut ResponseCache) -> R) -> R {
        f(&mut self.cache.lock())
    }

    /// Number of [`Session::login`] calls so far.
    pub fn login_attempts(&self) -> u32 {
        self.login_attempts.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(service = %self.service, "Session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Re-authenticate.
    ///
    /// Access tokens are long-lived and supplied by the user, so logging in
    /// again means falling back to the configured token. This recovers from a
    /// stale token restored from the token store.
    pub fn login(&self) -> Result<()> {
        self.login_attempts.fetch_add(1, Ordering::Relaxed);

        let configured = self.credential.access_token().trim();
        if configured.is_empty() {
            return Err(ConnectorError::TemporaryAuthentication(format!(
                "no access token configured for {}",
                self.service
            )));
        }

        info!(service = %self.service, "Re-authenticating with the configured access token");
        self.set_token(Some(configured.to_string()));
        Ok(())
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(Method::GET, url, RequestOptions::default()).await
    }

    /// Send a request with authentication headers and the retry policy applied.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        if self.is_closed() {
            return Err(ConnectorError::SessionClosed);
        }

        let parsed = Url::parse(url).map_err(|e| ConnectorError::retrieval(url, format!("invalid URL: {e}")))?;
        if parsed.scheme() != "https" {
            return Err(ConnectorError::InsecureTransport {
                url: url.to_string(),
            });
        }

        let token = match options.token {
            Some(token) => token,
            None => self.token().ok_or(ConnectorError::MissingToken)?,
        };
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ConnectorError::config("access token is not a valid header value"))?;

        let mut headers = options.headers;
        for (name, value) in &self.default_headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        headers.insert(AUTHORIZATION, bearer);

        let request = HttpRequest {
            method,
            url: parsed,
            headers,
            body: options.body,
            timeout: Some(options.timeout.unwrap_or(self.options.timeout)),
        };

        self.execute_with_retry(url, request).await
    }

    async fn execute_with_retry(&self, url: &str, request: HttpRequest) -> Result<HttpResponse> {
        let policy = &self.options.retry;
        let mut retry = 0u32;

        loop {
            match self.transport.execute(request.clone()).await {
                Ok(response)
                    if policy.is_retryable_status(response.status) && retry < policy.max_retries =>
                {
                    retry += 1;
                    let delay = policy.delay_for_retry(retry);
                    warn!(
                        url,
                        status = %response.status,
                        retry,
                        max = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after server error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && policy.is_enabled() => {
                    if retry >= policy.max_retries {
                        return Err(ConnectorError::transport(
                            url,
                            TransportError::RetriesExhausted {
                                attempts: retry + 1,
                                last: Box::new(err),
                            },
                        ));
                    }
                    retry += 1;
                    let delay = policy.delay_for_retry(retry);
                    warn!(
                        url,
                        error = %err,
                        retry,
                        max = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after transport error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(ConnectorError::transport(url, err)),
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("service", &self.service)
            .field("has_token", &self.token.read().is_some())
            .field("cached_urls", &self.cache.lock().len())
            .field("retry", &self.options.retry)
            .field("timeout", &self.options.timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

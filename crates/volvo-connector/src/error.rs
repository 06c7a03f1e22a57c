//! Error types for the connector.

use reqwest::StatusCode;
use thiserror::Error;

use crate::auth::Service;
use crate::transport::TransportError;

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// How the poll loop reacts to a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownClass {
    /// Rate limited by the provider, wait for the long quota cool-down.
    Quota,
    /// Transient failure, wait for the configured interval.
    Interval,
    /// Unclassified failure, the worker stops and the connector is unhealthy.
    Fatal,
}

/// Errors that can occur while talking to the Volvo API.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Attempted request over a non-encrypted transport.
    #[error("insecure transport: refusing to request {url}")]
    InsecureTransport { url: String },

    /// No access token available and none was supplied.
    #[error("missing access token")]
    MissingToken,

    /// Provider rate limit (HTTP 429).
    #[error("too many requests from this account for {url} (HTTP {status})")]
    QuotaExceeded { url: String, status: StatusCode },

    /// Network failure or a non-success status that was not allowed.
    #[error("could not fetch {url}: {reason}")]
    Retrieval {
        url: String,
        status: Option<StatusCode>,
        reason: String,
        #[source]
        source: Option<TransportError>,
    },

    /// Response shape does not match what the mappers expect.
    #[error("API compatibility error: {0}")]
    ApiCompatibility(String),

    /// The re-authentication attempt itself failed.
    #[error("temporary authentication error: {0}")]
    TemporaryAuthentication(String),

    /// No session implementation exists for this service.
    #[error("unsupported service: {0}")]
    UnsupportedService(Service),

    /// The session was closed during shutdown.
    #[error("session is closed")]
    SessionClosed,

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Token or cache store failure.
    #[error("store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl ConnectorError {
    /// Retrieval failure caused by an unexpected HTTP status.
    pub fn status(url: impl Into<String>, status: StatusCode, reason: impl Into<String>) -> Self {
        Self::Retrieval {
            url: url.into(),
            status: Some(status),
            reason: reason.into(),
            source: None,
        }
    }

    /// Retrieval failure caused by the transport.
    pub fn transport(url: impl Into<String>, source: TransportError) -> Self {
        Self::Retrieval {
            url: url.into(),
            status: None,
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Retrieval failure with a free-form reason.
    pub fn retrieval(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Retrieval {
            url: url.into(),
            status: None,
            reason: reason.into(),
            source: None,
        }
    }

    pub fn api_compatibility(message: impl Into<String>) -> Self {
        Self::ApiCompatibility(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// HTTP status attached to this error, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::QuotaExceeded { status, .. } => Some(*status),
            Self::Retrieval { status, .. } => *status,
            _ => None,
        }
    }

    /// Classify this error for the poll loop.
    pub fn cooldown_class(&self) -> CooldownClass {
        match self {
            Self::QuotaExceeded { .. } => CooldownClass::Quota,
            Self::Retrieval { .. }
            | Self::SessionClosed
            | Self::ApiCompatibility(_)
            | Self::TemporaryAuthentication(_) => CooldownClass::Interval,
            _ => CooldownClass::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_is_classified_for_long_cooldown() {
        let err = ConnectorError::QuotaExceeded {
            url: "https://api.volvocars.com/x".to_string(),
            status: StatusCode::TOO_MANY_REQUESTS,
        };
        assert_eq!(err.cooldown_class(), CooldownClass::Quota);
        assert_eq!(err.status_code(), Some(StatusCode::TOO_MANY_REQUESTS));
    }

    #[test]
    fn transient_errors_use_interval_cooldown() {
        let errors = [
            ConnectorError::retrieval("https://a", "boom"),
            ConnectorError::api_compatibility("vin missing"),
            ConnectorError::TemporaryAuthentication("no token".to_string()),
            ConnectorError::SessionClosed,
        ];
        for err in errors {
            assert_eq!(err.cooldown_class(), CooldownClass::Interval, "{err}");
        }
    }

    #[test]
    fn programming_errors_are_fatal() {
        assert_eq!(
            ConnectorError::InsecureTransport {
                url: "http://a".to_string()
            }
            .cooldown_class(),
            CooldownClass::Fatal
        );
        assert_eq!(ConnectorError::MissingToken.cooldown_class(), CooldownClass::Fatal);
        assert_eq!(
            ConnectorError::Internal("bug".to_string()).cooldown_class(),
            CooldownClass::Fatal
        );
    }
}

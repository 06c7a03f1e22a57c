//! Connector configuration.

use std::fmt;
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::auth::{RetryPolicy, SessionOptions, SessionToken};
use crate::error::{ConnectorError, Result};

/// Smallest accepted poll interval.
pub const MIN_INTERVAL: Duration = Duration::from_secs(60);

const DEFAULT_INTERVAL_SECS: u64 = 180;
const DEFAULT_TIMEOUT_SECS: u64 = 180;
const DEFAULT_RETRIES: u32 = 3;

const SECRET_FIELDS: &[&str] = &[
    "vcc_api_key_primary",
    "vcc_api_key_secondary",
    "connected_vehicle_token",
    "location_token",
];

/// Response cache lifetime setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxAge {
    /// One second less than the poll interval.
    #[default]
    Default,
    Seconds(u64),
    /// Always refetch.
    Never,
}

impl MaxAge {
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMaxAge {
    Seconds(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for MaxAge {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Option::<RawMaxAge>::deserialize(deserializer)? {
            None => Ok(Self::Never),
            Some(RawMaxAge::Seconds(secs)) => Ok(Self::Seconds(secs)),
            Some(RawMaxAge::Text(text)) if text.eq_ignore_ascii_case("never") => Ok(Self::Never),
            Some(RawMaxAge::Text(text)) => text.trim().parse().map(Self::Seconds).map_err(|_| {
                D::Error::custom(format!(
                    "invalid max_age {text:?}, expected seconds or \"never\""
                ))
            }),
        }
    }
}

impl Serialize for MaxAge {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Default => serializer.serialize_none(),
            Self::Seconds(secs) => serializer.serialize_u64(*secs),
            Self::Never => serializer.serialize_str("never"),
        }
    }
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

/// Settings of one connector instance (one Volvo developer account).
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    #[serde(default)]
    pub vcc_api_key_primary: Option<String>,
    #[serde(default)]
    pub vcc_api_key_secondary: Option<String>,
    #[serde(default)]
    pub connected_vehicle_token: Option<String>,
    /// Token for the location API. Falls back to `connected_vehicle_token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_token: Option<String>,
    /// Poll interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default, skip_serializing_if = "MaxAge::is_default")]
    pub max_age: MaxAge,
    /// VINs that are never added to the garage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hide_vins: Vec<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Retries for server errors and connection failures.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            vcc_api_key_primary: None,
            vcc_api_key_secondary: None,
            connected_vehicle_token: None,
            location_token: None,
            interval: DEFAULT_INTERVAL_SECS,
            max_age: MaxAge::Default,
            hide_vins: Vec::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
            retries: DEFAULT_RETRIES,
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConnectorError::config(format!("{name} was not found in config")))
}

impl ConnectorConfig {
    pub fn new(
        vcc_api_key_primary: impl Into<String>,
        vcc_api_key_secondary: impl Into<String>,
        connected_vehicle_token: impl Into<String>,
    ) -> Self {
        Self {
            vcc_api_key_primary: Some(vcc_api_key_primary.into()),
            vcc_api_key_secondary: Some(vcc_api_key_secondary.into()),
            connected_vehicle_token: Some(connected_vehicle_token.into()),
            ..Self::default()
        }
    }

    /// Parse from a JSON object, as handed over by a host.
    pub fn from_value(value: Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| ConnectorError::config(format!("invalid connector config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        required(&self.vcc_api_key_primary, "vcc_api_key_primary")?;
        required(&self.vcc_api_key_secondary, "vcc_api_key_secondary")?;
        required(&self.connected_vehicle_token, "connected_vehicle_token")?;
        if self.interval < MIN_INTERVAL.as_secs() {
            return Err(ConnectorError::config(format!(
                "interval must be at least {} seconds, got {}",
                MIN_INTERVAL.as_secs(),
                self.interval
            )));
        }
        if self.timeout == 0 {
            return Err(ConnectorError::config("timeout must be greater than zero"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Effective cache lifetime. `None` disables cache reads.
    pub fn max_age(&self) -> Option<Duration> {
        match self.max_age {
            MaxAge::Default => Some(Duration::from_secs(self.interval.saturating_sub(1))),
            MaxAge::Seconds(secs) => Some(Duration::from_secs(secs)),
            MaxAge::Never => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            retry: RetryPolicy::with_retries(self.retries),
            timeout: self.timeout(),
        }
    }

    pub fn connected_vehicle_credential(&self) -> Result<SessionToken> {
        Ok(SessionToken::new(
            required(&self.vcc_api_key_primary, "vcc_api_key_primary")?,
            required(&self.vcc_api_key_secondary, "vcc_api_key_secondary")?,
            required(&self.connected_vehicle_token, "connected_vehicle_token")?,
        ))
    }

    pub fn location_credential(&self) -> Result<SessionToken> {
        let token = match self.location_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => required(&self.connected_vehicle_token, "connected_vehicle_token")?,
        };
        Ok(SessionToken::new(
            required(&self.vcc_api_key_primary, "vcc_api_key_primary")?,
            required(&self.vcc_api_key_secondary, "vcc_api_key_secondary")?,
            token,
        ))
    }

    pub fn is_hidden(&self, vin: &str) -> bool {
        self.hide_vins.iter().any(|hidden| hidden == vin)
    }

    /// JSON rendering with every credential replaced by `***`.
    pub fn redacted(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            for field in SECRET_FIELDS {
                if let Some(slot) = map.get_mut(*field).filter(|v| !v.is_null()) {
                    *slot = Value::String("***".to_string());
                }
            }
        }
        value
    }
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectorConfig({})", self.redacted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "vcc_api_key_primary": "p",
            "vcc_api_key_secondary": "s",
            "connected_vehicle_token": "t",
        })
    }

    fn with(extra: Value) -> Value {
        let mut value = base();
        if let (Value::Object(map), Value::Object(extra)) = (&mut value, extra) {
            map.extend(extra);
        }
        value
    }

    #[test]
    fn defaults_apply() {
        let config = ConnectorConfig::from_value(base()).unwrap();
        assert_eq!(config.interval(), Duration::from_secs(180));
        assert_eq!(config.max_age(), Some(Duration::from_secs(179)));
        assert_eq!(config.timeout(), Duration::from_secs(180));
        assert_eq!(config.retries, 3);
    }

    #[test]
    fn max_age_follows_interval() {
        let config = ConnectorConfig::from_value(with(json!({"interval": 600}))).unwrap();
        assert_eq!(config.max_age(), Some(Duration::from_secs(599)));
    }

    #[test]
    fn max_age_accepts_seconds_never_and_null() {
        let seconds = ConnectorConfig::from_value(with(json!({"max_age": 30}))).unwrap();
        assert_eq!(seconds.max_age(), Some(Duration::from_secs(30)));

        let never = ConnectorConfig::from_value(with(json!({"max_age": "never"}))).unwrap();
        assert_eq!(never.max_age(), None);

        let null = ConnectorConfig::from_value(with(json!({"max_age": null}))).unwrap();
        assert_eq!(null.max_age(), None);

        assert!(ConnectorConfig::from_value(with(json!({"max_age": "soon"}))).is_err());
    }

    #[test]
    fn missing_credentials_fail() {
        for field in ["vcc_api_key_primary", "vcc_api_key_secondary", "connected_vehicle_token"] {
            let mut value = base();
            value.as_object_mut().unwrap().remove(field);
            let err = ConnectorConfig::from_value(value).unwrap_err();
            assert!(matches!(err, ConnectorError::Config(ref msg) if msg.contains(field)), "{err}");
        }
    }

    #[test]
    fn short_interval_fails() {
        let err = ConnectorConfig::from_value(with(json!({"interval": 59}))).unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
    }

    #[test]
    fn location_token_falls_back_to_connected_vehicle_token() {
        let config = ConnectorConfig::from_value(base()).unwrap();
        assert_eq!(config.location_credential().unwrap().access_token(), "t");

        let config = ConnectorConfig::from_value(with(json!({"location_token": "loc"}))).unwrap();
        assert_eq!(config.location_credential().unwrap().access_token(), "loc");
    }

    #[test]
    fn redaction_hides_credentials() {
        let config = ConnectorConfig::from_value(with(json!({"hide_vins": ["YV1"]}))).unwrap();
        let redacted = config.redacted();
        assert_eq!(redacted["vcc_api_key_primary"], "***");
        assert_eq!(redacted["connected_vehicle_token"], "***");
        assert_eq!(redacted["hide_vins"], json!(["YV1"]));
        assert!(!format!("{config:?}").contains("\"t\""));
        assert!(config.is_hidden("YV1"));
    }
}

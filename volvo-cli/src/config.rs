use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use volvo_connector::ConnectorConfig;

use crate::error::{AppError, Result};

const APP_DIR: &str = "volvo";

const TEMPLATE: &str = r#"# Connector id, used to tag the vehicles this host manages
id = "volvo"

[connector]
vcc_api_key_primary = ""
vcc_api_key_secondary = ""
connected_vehicle_token = ""
# location_token = ""
interval = 180
# max_age = 179
# hide_vins = []
# timeout = 180
# retries = 3
"#;

fn default_id() -> String {
    APP_DIR.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_id")]
    pub id: String,
    pub connector: ConnectorConfig,
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join("config.toml"))
            .ok_or(AppError::NoDirectory("config"))
    }

    pub fn default_state_path() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join("state.json"))
            .ok_or(AppError::NoDirectory("data"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::ConfigNotFound { path });
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.id.trim().is_empty() {
            return Err(AppError::Config("id must not be empty".to_string()));
        }
        config.connector.validate()?;
        Ok(config)
    }

    /// Replace the poll interval before the connector is built.
    pub fn with_interval(mut self, interval: Option<u64>) -> Result<Self> {
        if let Some(interval) = interval {
            self.connector.interval = interval;
            self.connector.validate()?;
        }
        Ok(self)
    }

    /// Write the template to `path` unless a file already exists there.
    pub fn init(path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };
        if path.exists() {
            return Err(AppError::Config(format!(
                "{} already exists",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, TEMPLATE)?;
        Ok(path)
    }

    /// Effective configuration with credentials masked.
    pub fn show(&self) -> Result<String> {
        let value = serde_json::json!({
            "id": self.id,
            "connector": self.connector.redacted(),
        });
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volvo_connector::{ConnectorError, MaxAge};

    const VALID: &str = r#"
        id = "garage-car"

        [connector]
        vcc_api_key_primary = "primary"
        vcc_api_key_secondary = "secondary"
        connected_vehicle_token = "token"
        interval = 300
        max_age = "never"
        hide_vins = ["YV1HIDDEN"]
    "#;

    #[test]
    fn parses_connector_section() {
        let config = AppConfig::parse(VALID).unwrap();
        assert_eq!(config.id, "garage-car");
        assert_eq!(config.connector.interval, 300);
        assert_eq!(config.connector.max_age, MaxAge::Never);
        assert!(config.connector.is_hidden("YV1HIDDEN"));
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let err = AppConfig::parse("[connector]\nvcc_api_key_primary = \"p\"\n").unwrap_err();
        assert!(matches!(err, AppError::Connector(ConnectorError::Config(_))));
    }

    #[test]
    fn interval_override_replaces_configured_interval() {
        let config = AppConfig::parse(VALID).unwrap().with_interval(Some(60)).unwrap();
        assert_eq!(config.connector.interval, 60);

        let err = AppConfig::parse(VALID).unwrap().with_interval(Some(10)).unwrap_err();
        assert!(matches!(err, AppError::Connector(ConnectorError::Config(_))));
    }

    #[test]
    fn template_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert_eq!(AppConfig::init(Some(&path)).unwrap(), path);
        assert!(AppConfig::init(Some(&path)).is_err());
        // the template parses but still lacks credentials
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(AppError::Connector(ConnectorError::Config(_)))
        ));
    }

    #[test]
    fn show_masks_secrets() {
        let shown = AppConfig::parse(VALID).unwrap().show().unwrap();
        assert!(!shown.contains("\"primary\""));
        assert!(shown.contains("***"));
    }
}

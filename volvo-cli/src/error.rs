use std::path::PathBuf;

use thiserror::Error;
use volvo_connector::{ConnectorError, TransportError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("HTTP client error: {0}")]
    Transport(#[from] TransportError),

    #[error("Update failed, see the log for details")]
    UpdateFailed,

    #[error("Configuration file {path} not found, create one with `volvo config --init`")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No usable {0} directory on this platform")]
    NoDirectory(&'static str),
}

pub type Result<T> = std::result::Result<T, AppError>;

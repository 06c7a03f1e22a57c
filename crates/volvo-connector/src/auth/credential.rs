//! Service identifiers and account credentials.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use strum::{AsRefStr, Display, EnumString};

/// Prefix of every persisted session identifier.
const IDENTIFIER_PREFIX: &str = "volvo-connector:";

/// Volvo cloud API families. Each one gets its own session.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
pub enum Service {
    #[strum(serialize = "VolvoConnectedVehicleAPI")]
    #[serde(rename = "VolvoConnectedVehicleAPI")]
    ConnectedVehicle,
    #[strum(serialize = "VolvoEnergyAPI")]
    #[serde(rename = "VolvoEnergyAPI")]
    Energy,
    #[strum(serialize = "VolvoLocationAPI")]
    #[serde(rename = "VolvoLocationAPI")]
    Location,
}

/// Credentials of one API account: the two application keys and a
/// long-lived access token.
///
/// Immutable once built. `Debug` never prints the secrets.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken {
    vcc_api_key_primary: String,
    vcc_api_key_secondary: String,
    access_token: String,
}

impl SessionToken {
    pub fn new(
        vcc_api_key_primary: impl Into<String>,
        vcc_api_key_secondary: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            vcc_api_key_primary: vcc_api_key_primary.into(),
            vcc_api_key_secondary: vcc_api_key_secondary.into(),
            access_token: access_token.into(),
        }
    }

    pub fn vcc_api_key_primary(&self) -> &str {
        &self.vcc_api_key_primary
    }

    pub fn vcc_api_key_secondary(&self) -> &str {
        &self.vcc_api_key_secondary
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Digest input: `primary:secondary:token`.
    fn digest_input(&self) -> String {
        format!(
            "{}:{}:{}",
            self.vcc_api_key_primary, self.vcc_api_key_secondary, self.access_token
        )
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("vcc_api_key_primary", &"***")
            .field("vcc_api_key_secondary", &"***")
            .field("access_token", &"***")
            .finish()
    }
}

/// SHA-512 over the service value and the credential fields, hex encoded.
pub fn generate_hash(service: Service, token: &SessionToken) -> String {
    let mut hasher = Sha512::new();
    hasher.update(service.as_ref().as_bytes());
    hasher.update(token.digest_input().as_bytes());
    hex::encode(hasher.finalize())
}

/// Key under which a session's token and cache are persisted.
///
/// Stable across restarts and distinct per service.
pub fn generate_identifier(service: Service, token: &SessionToken) -> String {
    format!("{IDENTIFIER_PREFIX}{}", generate_hash(service, token))
}

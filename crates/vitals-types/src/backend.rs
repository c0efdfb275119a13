//! Backend selection types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default MySQL port
pub const DEFAULT_RELATIONAL_PORT: u16 = 3306;

/// Which driver serves storage calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    #[serde(alias = "sqlite", alias = "bolt")]
    Embedded,
    #[serde(alias = "mysql")]
    Relational,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Embedded => write!(f, "embedded"),
            BackendKind::Relational => write!(f, "relational"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backend: {0}")]
pub struct ParseBackendKindError(pub String);

impl FromStr for BackendKind {
    type Err = ParseBackendKindError;

    /// Accepts the legacy driver names alongside the current ones
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" | "sqlite" | "bolt" => Ok(BackendKind::Embedded),
            "relational" | "mysql" => Ok(BackendKind::Relational),
            other => Err(ParseBackendKindError(other.to_string())),
        }
    }
}

/// Persisted backend configuration
///
/// Serialized flat with a `type` tag, e.g.
/// `{"type": "relational", "host": "db", "port": 3306, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    #[default]
    #[serde(alias = "sqlite", alias = "bolt")]
    Embedded,
    #[serde(alias = "mysql")]
    Relational(RelationalConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Embedded => BackendKind::Embedded,
            BackendConfig::Relational(_) => BackendKind::Relational,
        }
    }
}

/// Connection parameters for the relational backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalConfig {
    pub host: String,
    #[serde(
        default = "default_port",
        deserialize_with = "port_from_number_or_string"
    )]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(alias = "dbname")]
    pub database: String,
}

impl RelationalConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
        }
    }
}

impl fmt::Debug for RelationalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

fn default_port() -> u16 {
    DEFAULT_RELATIONAL_PORT
}

// Older config files stored the port as a string.
fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) if text.trim().is_empty() => Ok(DEFAULT_RELATIONAL_PORT),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Route must start with '/': {0}")]
    InvalidRoute(String),

    #[error("Datastore project id cannot be empty")]
    EmptyProjectId,
}

/// Where the bearer token for datastore requests comes from.
#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Credentials {
    None,
    #[default]
    MetadataServer,
    /// Token read once at start-up from the named environment variable.
    Token { env: String },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct DatastoreConfig {
    pub project_id: String,
    pub namespace: Option<String>,
    pub database_id: Option<String>,
    /// Overrides the public endpoint, e.g. to point at an emulator.
    pub endpoint: Option<url::Url>,
    #[serde(default)]
    pub credentials: Credentials,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum StoreConfig {
    Datastore(DatastoreConfig),
    Filesystem { path: PathBuf },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

fn default_route() -> String {
    "/".into()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    /// Path the lookup endpoint is served on.
    #[serde(default = "default_route")]
    pub route: String,
    /// Report a missing `term` as 400 instead of 500.
    #[serde(default)]
    pub strict_status_codes: bool,
    pub store: StoreConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;

        if !self.route.starts_with('/') {
            return Err(ValidationError::InvalidRoute(self.route.clone()));
        }

        if let StoreConfig::Datastore(datastore) = &self.store
            && datastore.project_id.trim().is_empty()
        {
            return Err(ValidationError::EmptyProjectId);
        }

        Ok(())
    }
}

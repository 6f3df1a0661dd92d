//! Declarative adapter configuration
//!
//! Selects default adapters and installs default transport settings from a
//! YAML document:
//!
//! ```yaml
//! http:
//!   default: reqwest
//!   settings:
//!     timeout_ms: 5000
//!     headers: { X-Client: app }
//! data_service:
//!   default: webApi
//! ```

use crate::http::TransportSettings;
use crate::registry::{AdapterKind, AdapterRegistry, RegistryError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Adapter to make the http default.
    pub default: Option<String>,
    /// Installed as default settings on the default http adapter.
    pub settings: TransportSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataServiceConfig {
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub http: HttpConfig,
    pub data_service: DataServiceConfig,
}

impl AdapterConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Select the configured defaults, then overlay `http.settings` onto the
    /// default http adapter.
    ///
    /// The http default is rebound first so data-service adapters already
    /// constructed rebind before their own default changes.
    pub fn apply(&self, registry: &AdapterRegistry) -> Result<(), ConfigError> {
        if let Some(name) = &self.http.default {
            registry.set_default(AdapterKind::Http, name)?;
        }
        if let Some(name) = &self.data_service.default {
            registry.set_default(AdapterKind::DataService, name)?;
        }
        if !self.http.settings.is_empty() {
            let http = registry.http_adapter(None)?;
            http.configure(http.default_settings().overlay(&self.http.settings));
            debug!(http = http.name(), "installed default transport settings");
        }
        Ok(())
    }
}

//! Connector configuration: identity, type discriminator, and settings map.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ConnectorError;

/// Key/value settings for one connector.
pub type Settings = BTreeMap<String, String>;

/// Configuration for one monitored source.
///
/// The `id` is assigned once when the configuration entry is created and is
/// never regenerated; persistence layers serialize the whole struct (identity,
/// type discriminator, settings) and hand it back verbatim on restart.
///
/// # Example
///
/// ```rust
/// use buildwatch_connectors::ConnectorConfig;
///
/// let config = ConnectorConfig::new("cruise", "api-server build")
///     .with_setting("address", "http://ci.example.org")
///     .with_setting("project", "api-server");
///
/// assert_eq!(config.require("project").unwrap(), "api-server");
/// assert!(config.require("password").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Stable identity, assigned once at configuration time.
    pub id: Uuid,

    /// Type discriminator used to pick a factory from the registry.
    pub kind: String,

    /// Display name.
    pub name: String,

    /// Free-text description.
    #[serde(default)]
    pub description: String,

    /// Connector-specific settings.
    #[serde(default)]
    pub settings: Settings,
}

impl ConnectorConfig {
    /// Create a configuration with a fresh identity.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            name: name.into(),
            description: String::new(),
            settings: Settings::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add one setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Look up a setting.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Look up a mandatory setting, failing fast when it is missing or
    /// empty.
    pub fn require(&self, key: &str) -> Result<&str, ConnectorError> {
        match self.get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConnectorError::Configuration(format!(
                "connector '{}' requires a non-empty '{}' setting",
                self.name, key
            ))),
        }
    }

    /// Parse an optional whole-seconds setting into a duration.
    pub fn seconds(&self, key: &str, default: Duration) -> Result<Duration, ConnectorError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| {
                    ConnectorError::Configuration(format!(
                        "connector '{}': setting '{}' must be a whole number of seconds, got '{}'",
                        self.name, key, raw
                    ))
                }),
        }
    }
}

//! Explicit connector registry: type discriminator to factory.
//!
//! Connector kinds are registered by explicit calls at startup; there is no
//! discovery. The registry is passed to whatever loads configuration, so
//! there is no process-wide mutable state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use buildwatch_connectors::{Connector, ConnectorConfig, ConnectorError};

/// A factory producing a connector from a configuration entry.
pub type ConnectorFactory =
    Box<dyn Fn(ConnectorConfig) -> Result<Arc<dyn Connector>, ConnectorError> + Send + Sync>;

/// Maps type discriminator strings to connector factories.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use buildwatch::ConnectorRegistry;
/// use buildwatch_connectors::cruise::{self, CruiseFeedCache};
/// use buildwatch_connectors::ping;
///
/// let mut registry = ConnectorRegistry::new();
/// registry.register(cruise::KIND, cruise::factory(Arc::new(CruiseFeedCache::new())));
/// registry.register(ping::KIND, ping::factory);
/// ```
#[derive(Default)]
pub struct ConnectorRegistry {
    factories: BTreeMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a factory for a connector kind.
    ///
    /// A later registration for the same kind replaces the earlier one.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(ConnectorConfig) -> Result<Arc<dyn Connector>, ConnectorError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// The registered kinds, in order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create a connector from a configuration entry.
    ///
    /// Fails with a configuration error when the kind is unknown; factory
    /// validation failures propagate unchanged.
    pub fn create(&self, config: ConnectorConfig) -> Result<Arc<dyn Connector>, ConnectorError> {
        match self.factories.get(&config.kind) {
            Some(factory) => factory(config),
            None => Err(ConnectorError::Configuration(format!(
                "unknown connector kind '{}'",
                config.kind
            ))),
        }
    }
}

impl fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

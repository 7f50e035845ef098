//! TCP reachability probe connector.
//!
//! Opens a TCP connection to the configured address on every poll. An
//! unreachable target is a completed observation - a failure status with the
//! error text as detail - not a poll error, so the probe's state is always
//! displayable. There is no notion of discrete builds, so no history is
//! recorded.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use buildwatch_types::{BuildState, Status, DEFAULT_MAX_SNAPSHOTS};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::{Connector, ConnectorConfig, ConnectorError, ConnectorState, DEFAULT_POLL_INTERVAL};

/// Type discriminator for registry registration.
pub const KIND: &str = "ping";

/// Default connect timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connector probing one `host:port` target for reachability.
pub struct PingConnector {
    config: ConnectorConfig,
    state: ConnectorState,
    address: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl PingConnector {
    /// Create a new builder for configuring the probe.
    pub fn builder() -> PingConnectorBuilder {
        PingConnectorBuilder::default()
    }

    /// Construct from a configuration entry.
    ///
    /// Required setting: `address` (`host:port`). Optional:
    /// `intervalSeconds`, `timeoutSeconds`. Fails fast when `address` is
    /// missing or empty.
    pub fn from_config(config: ConnectorConfig) -> Result<Self, ConnectorError> {
        let address = config.require("address")?.to_string();
        let timeout = config.seconds("timeoutSeconds", DEFAULT_TIMEOUT)?;
        let poll_interval = config.seconds("intervalSeconds", DEFAULT_POLL_INTERVAL)?;

        Ok(Self {
            state: ConnectorState::new(&config.name, DEFAULT_MAX_SNAPSHOTS),
            config,
            address,
            timeout,
            poll_interval,
        })
    }

    /// The probed `host:port` address.
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Connector for PingConnector {
    fn configuration(&self) -> &ConnectorConfig {
        &self.config
    }

    fn state(&self) -> &ConnectorState {
        &self.state
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn fetch_status(&self, cancel: &CancellationToken) -> Result<Status, ConnectorError> {
        let started = tokio::time::Instant::now();
        let attempt = tokio::time::timeout(self.timeout, TcpStream::connect(&self.address));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConnectorError::Cancelled),
            result = attempt => match result {
                Ok(Ok(_stream)) => Ok(Status::builder(self.name())
                    .state(BuildState::Success)
                    .duration(started.elapsed())
                    .build()),
                Ok(Err(err)) => Ok(Status::builder(self.name())
                    .state(BuildState::Failure)
                    .detail(format!("connect to {} failed: {}", self.address, err))
                    .build()),
                Err(_elapsed) => Ok(Status::builder(self.name())
                    .state(BuildState::Failure)
                    .detail(format!(
                        "connect to {} timed out after {:?}",
                        self.address, self.timeout
                    ))
                    .build()),
            },
        }
    }
}

impl fmt::Debug for PingConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PingConnector")
            .field("name", &self.config.name)
            .field("address", &self.address)
            .finish()
    }
}

/// Builder for [`PingConnector`].
#[derive(Debug, Default)]
pub struct PingConnectorBuilder {
    name: Option<String>,
    address: Option<String>,
    timeout: Option<Duration>,
    poll_interval: Option<Duration>,
}

impl PingConnectorBuilder {
    /// Set the display name (default: the address).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the `host:port` target.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the connect timeout (default: 5 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the polling interval (default: 5 seconds).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Build the probe.
    pub fn build(self) -> Result<PingConnector, ConnectorError> {
        let name = self
            .name
            .or_else(|| self.address.clone())
            .unwrap_or_default();
        let mut config = ConnectorConfig::new(KIND, name);
        if let Some(address) = self.address {
            config = config.with_setting("address", address);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_setting("timeoutSeconds", timeout.as_secs().to_string());
        }
        if let Some(interval) = self.poll_interval {
            config = config.with_setting("intervalSeconds", interval.as_secs().to_string());
        }
        PingConnector::from_config(config)
    }
}

/// Connector factory for registry registration.
pub fn factory(
    config: ConnectorConfig,
) -> Result<std::sync::Arc<dyn Connector>, ConnectorError> {
    let connector = PingConnector::from_config(config)?;
    Ok(std::sync::Arc::new(connector) as std::sync::Arc<dyn Connector>)
}

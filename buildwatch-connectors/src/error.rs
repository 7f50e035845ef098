//! Error types for connectors.

use thiserror::Error;

/// Broad classification of a connector failure, used for distinct logging
/// and for deciding how a failed poll is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport-level failure: the remote never answered usefully.
    Connectivity,
    /// The remote answered, but the exchange could not be interpreted.
    Protocol,
    /// The poll was aborted by scheduler shutdown.
    Cancelled,
    /// The connector's configuration is unusable.
    Configuration,
}

/// Errors that can occur while polling a monitored source.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// Connection failed (refused, unreachable, DNS).
    #[error("connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for the remote.
    #[error("request timed out")]
    Timeout,

    /// HTTP request failed with a non-success status.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Authentication rejected by the remote.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The remote responded but the payload could not be interpreted.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// The poll was cancelled by shutdown.
    #[error("poll cancelled")]
    Cancelled,

    /// A required configuration key is missing or empty.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ConnectorError {
    /// Classify this error for logging and surfacing decisions.
    pub fn kind(&self) -> FailureKind {
        match self {
            ConnectorError::Connection(_) | ConnectorError::Timeout => FailureKind::Connectivity,
            ConnectorError::Http(_) | ConnectorError::Auth(_) | ConnectorError::Protocol(_) => {
                FailureKind::Protocol
            }
            ConnectorError::Cancelled => FailureKind::Cancelled,
            ConnectorError::Configuration(_) => FailureKind::Configuration,
        }
    }
}

#[cfg(feature = "cruise")]
impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ConnectorError::Timeout
        } else if err.is_connect() {
            ConnectorError::Connection(err.to_string())
        } else {
            ConnectorError::Http(err.to_string())
        }
    }
}

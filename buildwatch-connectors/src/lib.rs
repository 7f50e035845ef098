//! # buildwatch-connectors
//!
//! Source connectors for buildwatch. A connector represents one monitored
//! source - a CI project, a reachability target - and knows how to fetch its
//! current status, reconcile it into a bounded history, and surface failures
//! as displayable statuses instead of escaping errors.
//!
//! ## Built-in connectors
//!
//! - **Cruise** (`cruise` feature) - a CruiseControl-style CI server queried
//!   over its HTTP dashboard API; all projects on one server share a
//!   single-flight [`FeedCache`]
//! - **Ping** (`ping` feature) - a plain TCP reachability probe with no
//!   build history
//!
//! ## Quick Start (Cruise)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use buildwatch_connectors::cruise::{CruiseConnector, CruiseFeedCache};
//! use buildwatch_connectors::Connector;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = Arc::new(CruiseFeedCache::new());
//!     let connector = CruiseConnector::builder()
//!         .endpoint("http://ci.example.org")
//!         .project("api-server")
//!         .build(cache)?;
//!
//!     let outcome = connector.query_status(&CancellationToken::new()).await;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod cache;
mod config;
mod error;
mod state;

#[cfg(feature = "cruise")]
pub mod cruise;

#[cfg(feature = "ping")]
pub mod ping;

pub use cache::{normalize_address, FeedCache};
pub use config::{ConnectorConfig, Settings};
pub use error::{ConnectorError, FailureKind};
pub use state::ConnectorState;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use buildwatch_types::{BuildState, Snapshot, Status};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

/// Default per-connector polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome of one driven poll.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The poll ran to completion and this status was committed.
    Completed(Status),
    /// The poll was aborted by shutdown; nothing was committed.
    Cancelled,
}

impl QueryOutcome {
    /// The committed status, if the poll completed.
    pub fn completed(&self) -> Option<&Status> {
        match self {
            QueryOutcome::Completed(status) => Some(status),
            QueryOutcome::Cancelled => None,
        }
    }
}

/// One monitored source.
///
/// Implementations provide the fallible fetch operations; the provided
/// [`query_status`](Connector::query_status) driver turns every fetch result
/// into a committed [`Status`], so a failing source never takes down the
/// polling loop that drives it.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Stable identity, assigned once at configuration time.
    fn id(&self) -> Uuid {
        self.configuration().id
    }

    /// Display name.
    fn name(&self) -> &str {
        &self.configuration().name
    }

    /// Free-text description.
    fn description(&self) -> &str {
        &self.configuration().description
    }

    /// The configuration this connector was constructed from.
    fn configuration(&self) -> &ConnectorConfig;

    /// Shared observation state (current status + history).
    fn state(&self) -> &ConnectorState;

    /// How often this source wants to be polled.
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Whether a completed poll result is eligible for the history.
    ///
    /// Defaults to never: sources with no notion of discrete builds do not
    /// accumulate history. Sources with discrete builds override this.
    fn should_take_snapshot(&self, _status: &Status) -> bool {
        false
    }

    /// Fetch the current status from the remote source.
    ///
    /// Must return [`ConnectorError::Cancelled`] when `cancel` fires
    /// mid-fetch, never a connectivity error.
    async fn fetch_status(&self, cancel: &CancellationToken) -> Result<Status, ConnectorError>;

    /// Fetch recent build history from the remote source.
    ///
    /// Optional capability; sources with no history concept return an empty
    /// sequence.
    async fn fetch_history(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Status>, ConnectorError> {
        Ok(Vec::new())
    }

    /// The latest committed status.
    fn current_status(&self) -> Status {
        self.state().current_status()
    }

    /// A read-only copy of the recorded history, oldest first.
    fn snapshots(&self) -> Vec<Snapshot> {
        self.state().snapshots()
    }

    /// Run one poll: fetch, convert any failure into a displayable status,
    /// and commit.
    ///
    /// A cancelled fetch commits nothing - the previous status and history
    /// are left exactly as they were. Every other failure becomes an
    /// `Unknown` status carrying the error text, so the last-known state is
    /// always available for display.
    async fn query_status(&self, cancel: &CancellationToken) -> QueryOutcome {
        let status = match self.fetch_status(cancel).await {
            Ok(status) => status,
            Err(ConnectorError::Cancelled) => return QueryOutcome::Cancelled,
            Err(err) => {
                match err.kind() {
                    FailureKind::Connectivity => {
                        warn!(connector = %self.name(), error = %err, "source unreachable")
                    }
                    FailureKind::Protocol => {
                        warn!(connector = %self.name(), error = %err, "source sent an unusable response")
                    }
                    FailureKind::Cancelled | FailureKind::Configuration => {
                        warn!(connector = %self.name(), error = %err, "poll failed")
                    }
                }
                Status::builder(self.name())
                    .state(BuildState::Unknown)
                    .detail(err.to_string())
                    .build()
            }
        };

        let take = self.should_take_snapshot(&status);
        self.state().commit(status.clone(), take);
        QueryOutcome::Completed(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Debug)]
    struct ScriptedConnector {
        config: ConnectorConfig,
        state: ConnectorState,
        script: Mutex<VecDeque<Result<Status, ConnectorError>>>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Result<Status, ConnectorError>>) -> Self {
            let config = ConnectorConfig::new("scripted", "svc");
            Self {
                state: ConnectorState::new(&config.name, 8),
                config,
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        fn configuration(&self) -> &ConnectorConfig {
            &self.config
        }

        fn state(&self) -> &ConnectorState {
            &self.state
        }

        async fn fetch_status(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<Status, ConnectorError> {
            self.script
                .lock()
                .pop_front()
                .expect("script exhausted")
        }
    }

    #[tokio::test]
    async fn completed_poll_commits_current_status() {
        let status = Status::builder("svc").state(BuildState::Success).build();
        let connector = ScriptedConnector::new(vec![Ok(status)]);

        let outcome = connector.query_status(&CancellationToken::new()).await;
        assert_eq!(
            outcome.completed().unwrap().state,
            BuildState::Success
        );
        assert_eq!(connector.current_status().state, BuildState::Success);
    }

    #[tokio::test]
    async fn fetch_error_becomes_unknown_status_with_detail() {
        let connector = ScriptedConnector::new(vec![Err(ConnectorError::Connection(
            "refused".into(),
        ))]);

        let outcome = connector.query_status(&CancellationToken::new()).await;
        let status = outcome.completed().unwrap();
        assert_eq!(status.state, BuildState::Unknown);
        assert!(status.detail.as_deref().unwrap().contains("refused"));
        assert_eq!(connector.current_status().state, BuildState::Unknown);
    }

    #[tokio::test]
    async fn cancellation_commits_nothing() {
        let success = Status::builder("svc")
            .state(BuildState::Success)
            .build_number(3)
            .build();
        let connector =
            ScriptedConnector::new(vec![Ok(success), Err(ConnectorError::Cancelled)]);
        let token = CancellationToken::new();

        connector.query_status(&token).await;
        let before = connector.current_status();

        let outcome = connector.query_status(&token).await;
        assert_eq!(outcome, QueryOutcome::Cancelled);
        assert!(outcome.completed().is_none());
        assert_eq!(connector.current_status(), before);
        assert!(connector.snapshots().is_empty());
    }

    #[tokio::test]
    async fn default_policy_never_records_history() {
        let status = Status::builder("svc")
            .state(BuildState::Success)
            .build_number(1)
            .build();
        let connector = ScriptedConnector::new(vec![Ok(status)]);

        connector.query_status(&CancellationToken::new()).await;
        assert!(connector.snapshots().is_empty());
    }

    #[tokio::test]
    async fn failure_does_not_wipe_previous_detail_until_committed() {
        let success = Status::builder("svc")
            .state(BuildState::Success)
            .detail("all green")
            .build();
        let connector = ScriptedConnector::new(vec![
            Ok(success),
            Err(ConnectorError::Timeout),
        ]);
        let token = CancellationToken::new();

        connector.query_status(&token).await;
        connector.query_status(&token).await;

        // The failure produced a fresh displayable status; nothing was wiped
        // to "no status at all".
        let current = connector.current_status();
        assert_eq!(current.state, BuildState::Unknown);
        assert!(current.detail.is_some());
    }
}

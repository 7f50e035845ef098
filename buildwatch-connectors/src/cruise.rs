//! CruiseControl-style CI server connector.
//!
//! Queries a continuous-integration server over its HTTP dashboard API. The
//! server reports every project it hosts in one call, so all connectors for
//! projects on the same server share a [`CruiseFeedCache`]: within one
//! polling window a single fetch serves them all, and each connector narrows
//! the shared feed down to its own project.
//!
//! ## Example
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
//!
//!     let api = CruiseConnector::builder()
//!         .endpoint("http://ci.example.org")
//!         .project("api-server")
//!         .credentials("admin", "secret")
//!         .build(Arc::clone(&cache))?;
//!     let web = CruiseConnector::builder()
//!         .endpoint("http://ci.example.org")
//!         .project("web-frontend")
//!         .build(cache)?;
//!
//!     // Both connectors share one underlying fetch per window.
//!     let token = CancellationToken::new();
//!     api.query_status(&token).await;
//!     web.query_status(&token).await;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use async_trait::async_trait;
use buildwatch_types::{BuildState, Status, DEFAULT_MAX_SNAPSHOTS};
use tokio_util::sync::CancellationToken;

use crate::cache::{normalize_address, FeedCache};
use crate::{Connector, ConnectorConfig, ConnectorError, ConnectorState, DEFAULT_POLL_INTERVAL};

/// Type discriminator for registry registration.
pub const KIND: &str = "cruise";

/// Default HTTP request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared per-server cache of full project feeds.
pub type CruiseFeedCache = FeedCache<Vec<ProjectStatus>>;

/// One project's entry in the server feed.
///
/// `lastBuildLabel` names the most recent build, including one currently in
/// progress, so a running build carries the identity its final result will
/// later be recorded under.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    pub name: String,
    #[serde(default)]
    pub activity: Activity,
    #[serde(default)]
    pub last_build_status: BuildResult,
    #[serde(default)]
    pub last_build_label: String,
    #[serde(default)]
    pub next_build_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_build_duration_seconds: Option<u64>,
    #[serde(default)]
    pub estimated_build_duration_seconds: Option<u64>,
    #[serde(default)]
    pub messages: Vec<ProjectMessage>,
}

/// What the project is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Activity {
    #[default]
    Sleeping,
    Building,
    CheckingModifications,
}

/// Result of the project's last completed build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum BuildResult {
    #[default]
    Unknown,
    Success,
    Failure,
    Exception,
}

/// A diagnostic message attached to a project.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub kind: MessageKind,
}

/// Category of a project message.
///
/// Only `FailingTasks` blocks: a breaker list names who last touched a
/// build and is informational on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum MessageKind {
    #[default]
    NotDefined,
    Breakers,
    Fixer,
    FailingTasks,
    BuildAbortedBy,
}

impl MessageKind {
    fn is_blocking(&self) -> bool {
        matches!(self, MessageKind::FailingTasks)
    }
}

/// One entry in a project's build history feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub status: BuildResult,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
}

/// Connector for one CI project hosted on a CruiseControl-style server.
pub struct CruiseConnector {
    config: ConnectorConfig,
    state: ConnectorState,
    client: Client,
    server_address: String,
    project: String,
    credentials: Option<(String, String)>,
    poll_interval: Duration,
    cache: Arc<CruiseFeedCache>,
}

impl CruiseConnector {
    /// Create a new builder for configuring the connector.
    pub fn builder() -> CruiseConnectorBuilder {
        CruiseConnectorBuilder::default()
    }

    /// Construct from a configuration entry.
    ///
    /// Required settings: `address` (server URL) and `project`. Optional:
    /// `username`/`password`, `intervalSeconds`, `timeoutSeconds`,
    /// `maxSnapshots`. Fails fast when a required setting is missing or
    /// empty.
    pub fn from_config(
        config: ConnectorConfig,
        cache: Arc<CruiseFeedCache>,
    ) -> Result<Self, ConnectorError> {
        let server_address = normalize_address(config.require("address")?);
        let project = config.require("project")?.to_string();
        let credentials = match (config.get("username"), config.get("password")) {
            (Some(user), Some(pass)) => Some((user.to_string(), pass.to_string())),
            _ => None,
        };
        let poll_interval = config.seconds("intervalSeconds", DEFAULT_POLL_INTERVAL)?;
        let timeout = config.seconds("timeoutSeconds", DEFAULT_TIMEOUT)?;
        let max_snapshots = match config.get("maxSnapshots") {
            None => DEFAULT_MAX_SNAPSHOTS,
            Some(raw) => raw.parse().map_err(|_| {
                ConnectorError::Configuration(format!(
                    "connector '{}': setting 'maxSnapshots' must be a whole number, got '{}'",
                    config.name, raw
                ))
            })?,
        };
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::Configuration(e.to_string()))?;

        Ok(Self {
            state: ConnectorState::new(&config.name, max_snapshots),
            config,
            client,
            server_address,
            project,
            credentials,
            poll_interval,
            cache,
        })
    }

    /// The normalized server address this connector polls.
    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    /// The logical project this connector narrows the feed to.
    pub fn project(&self) -> &str {
        &self.project
    }
}

#[async_trait]
impl Connector for CruiseConnector {
    fn configuration(&self) -> &ConnectorConfig {
        &self.config
    }

    fn state(&self) -> &ConnectorState {
        &self.state
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn should_take_snapshot(&self, status: &Status) -> bool {
        // Builds are discrete: record every poll that carries a build
        // identity. Fetch failures have none and stay out of the history.
        status.has_build_identity()
    }

    async fn fetch_status(&self, cancel: &CancellationToken) -> Result<Status, ConnectorError> {
        let fetch = {
            let client = self.client.clone();
            let address = self.server_address.clone();
            let credentials = self.credentials.clone();
            move || fetch_project_feed(client, address, credentials)
        };

        let feed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
            result = self.cache.get_or_fetch(&self.server_address, self.poll_interval, fetch) => {
                result?
            }
        };

        let project = feed
            .iter()
            .find(|p| p.name == self.project)
            .ok_or_else(|| {
                ConnectorError::Protocol(format!(
                    "project '{}' not present in the feed from {}",
                    self.project, self.server_address
                ))
            })?;

        Ok(status_from_project(self.name(), project, Utc::now()))
    }

    async fn fetch_history(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Status>, ConnectorError> {
        let url = format!(
            "{}/api/projects/{}/builds",
            self.server_address, self.project
        );
        let mut request = self.client.get(&url);
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, Some(pass));
        }

        let fetch = async move {
            let response = request.send().await?;
            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                return Err(ConnectorError::Auth("invalid credentials".to_string()));
            }
            if !response.status().is_success() {
                return Err(ConnectorError::Http(format!(
                    "server returned status {}",
                    response.status()
                )));
            }
            let builds: Vec<BuildRecord> = response
                .json()
                .await
                .map_err(|e| ConnectorError::Protocol(e.to_string()))?;
            Ok(builds)
        };

        let builds = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
            result = fetch => result?,
        };

        Ok(builds
            .iter()
            .map(|build| status_from_build(self.name(), build))
            .collect())
    }
}

impl fmt::Debug for CruiseConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CruiseConnector")
            .field("name", &self.config.name)
            .field("server_address", &self.server_address)
            .field("project", &self.project)
            .finish()
    }
}

/// Fetch the full project feed for one server.
async fn fetch_project_feed(
    client: Client,
    address: String,
    credentials: Option<(String, String)>,
) -> Result<Vec<ProjectStatus>, ConnectorError> {
    let url = format!("{address}/api/projects");
    let mut request = client.get(&url);
    if let Some((user, pass)) = &credentials {
        request = request.basic_auth(user, Some(pass));
    }

    let response = request.send().await?;
    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ConnectorError::Auth("invalid credentials".to_string()));
    }
    if !response.status().is_success() {
        return Err(ConnectorError::Http(format!(
            "server returned status {}",
            response.status()
        )));
    }

    let feed: Vec<ProjectStatus> = response
        .json()
        .await
        .map_err(|e| ConnectorError::Protocol(e.to_string()))?;
    Ok(feed)
}

/// Map one project feed entry to a status.
///
/// Precedence: an active build wins over any stale last-build result; a
/// failed or errored last build, or any blocking message, means failure; a
/// clean success means success; anything else is unknown.
fn status_from_project(name: &str, project: &ProjectStatus, polled_at: DateTime<Utc>) -> Status {
    let blocking = project.messages.iter().any(|m| m.kind.is_blocking());

    let state = if project.activity == Activity::Building {
        BuildState::Running
    } else if blocking
        || matches!(
            project.last_build_status,
            BuildResult::Failure | BuildResult::Exception
        )
    {
        BuildState::Failure
    } else if project.last_build_status == BuildResult::Success {
        BuildState::Success
    } else {
        BuildState::Unknown
    };

    // While building, the scheduled build time is the best estimate of the
    // start. Completed polls are stamped with the poll instant; the server's
    // own completion times are not comparable across servers.
    let time = if state == BuildState::Running {
        project.next_build_time.unwrap_or(polled_at)
    } else {
        polled_at
    };

    let detail = {
        let texts: Vec<&str> = project
            .messages
            .iter()
            .map(|m| m.text.as_str())
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("; "))
        }
    };

    let mut builder = Status::builder(name)
        .state(state)
        .time(time)
        .build_number(build_number_from_label(&project.last_build_label));
    if let Some(secs) = project.last_build_duration_seconds {
        builder = builder.duration(Duration::from_secs(secs));
    }
    if let Some(secs) = project.estimated_build_duration_seconds {
        builder = builder.estimated_duration(Duration::from_secs(secs));
    }
    if let Some(detail) = detail {
        builder = builder.detail(detail);
    }
    builder.build()
}

/// Map one build history record to a status.
fn status_from_build(name: &str, build: &BuildRecord) -> Status {
    let state = match build.status {
        BuildResult::Success => BuildState::Success,
        BuildResult::Failure | BuildResult::Exception => BuildState::Failure,
        BuildResult::Unknown => BuildState::Unknown,
    };

    let mut builder = Status::builder(name)
        .state(state)
        .build_number(build_number_from_label(&build.label));
    if let Some(time) = build.time {
        builder = builder.time(time);
    }
    if let Some(secs) = build.duration_seconds {
        builder = builder.duration(Duration::from_secs(secs));
    }
    builder.build()
}

/// Extract the trailing numeric run of a build label as the build identity.
///
/// Labels like `build.128` or `1.0.0.128` yield 128; labels with no trailing
/// digits carry no identity.
fn build_number_from_label(label: &str) -> u64 {
    let digits: Vec<char> = label
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits
        .into_iter()
        .rev()
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

/// Build a connector factory closure for registry registration.
///
/// Every connector produced by the returned factory shares the given feed
/// cache, so projects hosted on the same server collapse into one fetch per
/// window.
pub fn factory(
    cache: Arc<CruiseFeedCache>,
) -> impl Fn(ConnectorConfig) -> Result<Arc<dyn Connector>, ConnectorError> + Send + Sync + 'static
{
    move |config| {
        let connector = CruiseConnector::from_config(config, Arc::clone(&cache))?;
        Ok(Arc::new(connector) as Arc<dyn Connector>)
    }
}

/// Builder for [`CruiseConnector`].
#[derive(Debug, Default)]
pub struct CruiseConnectorBuilder {
    name: Option<String>,
    endpoint: Option<String>,
    project: Option<String>,
    credentials: Option<(String, String)>,
    poll_interval: Option<Duration>,
    timeout: Option<Duration>,
    max_snapshots: Option<usize>,
}

impl CruiseConnectorBuilder {
    /// Set the display name (default: the project name).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the server URL (e.g. `http://ci.example.org`).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the project to narrow the server feed to.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Set the username and password for authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Set the polling interval (default: 5 seconds).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the history capacity (default: 32).
    pub fn max_snapshots(mut self, max: usize) -> Self {
        self.max_snapshots = Some(max);
        self
    }

    /// Build the connector against the given shared feed cache.
    pub fn build(self, cache: Arc<CruiseFeedCache>) -> Result<CruiseConnector, ConnectorError> {
        let name = self
            .name
            .or_else(|| self.project.clone())
            .unwrap_or_default();
        let mut config = ConnectorConfig::new(KIND, name);
        if let Some(endpoint) = self.endpoint {
            config = config.with_setting("address", endpoint);
        }
        if let Some(project) = self.project {
            config = config.with_setting("project", project);
        }
        if let Some((user, pass)) = self.credentials {
            config = config
                .with_setting("username", user)
                .with_setting("password", pass);
        }
        if let Some(interval) = self.poll_interval {
            config = config.with_setting("intervalSeconds", interval.as_secs().to_string());
        }
        if let Some(timeout) = self.timeout {
            config = config.with_setting("timeoutSeconds", timeout.as_secs().to_string());
        }
        if let Some(max) = self.max_snapshots {
            config = config.with_setting("maxSnapshots", max.to_string());
        }
        CruiseConnector::from_config(config, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(activity: Activity, result: BuildResult) -> ProjectStatus {
        ProjectStatus {
            name: "api-server".to_string(),
            activity,
            last_build_status: result,
            last_build_label: "build.12".to_string(),
            next_build_time: None,
            last_build_duration_seconds: None,
            estimated_build_duration_seconds: None,
            messages: Vec::new(),
        }
    }

    fn message(kind: MessageKind, text: &str) -> ProjectMessage {
        ProjectMessage {
            text: text.to_string(),
            kind,
        }
    }

    #[test]
    fn building_wins_over_stale_build_result() {
        for result in [
            BuildResult::Success,
            BuildResult::Failure,
            BuildResult::Unknown,
        ] {
            let status = status_from_project(
                "api",
                &project(Activity::Building, result),
                Utc::now(),
            );
            assert_eq!(status.state, BuildState::Running);
        }
    }

    #[test]
    fn breakers_alone_do_not_fail_a_build() {
        let mut p = project(Activity::Sleeping, BuildResult::Success);
        p.messages.push(message(MessageKind::Breakers, "alice"));

        let status = status_from_project("api", &p, Utc::now());
        assert_eq!(status.state, BuildState::Success);
        assert_eq!(status.detail.as_deref(), Some("alice"));
    }

    #[test]
    fn failing_tasks_message_blocks() {
        let mut p = project(Activity::Sleeping, BuildResult::Success);
        p.messages
            .push(message(MessageKind::FailingTasks, "unit-tests"));

        let status = status_from_project("api", &p, Utc::now());
        assert_eq!(status.state, BuildState::Failure);
    }

    #[test]
    fn exception_is_a_failure() {
        let status = status_from_project(
            "api",
            &project(Activity::Sleeping, BuildResult::Exception),
            Utc::now(),
        );
        assert_eq!(status.state, BuildState::Failure);
    }

    #[test]
    fn no_signal_is_unknown() {
        let status = status_from_project(
            "api",
            &project(Activity::Sleeping, BuildResult::Unknown),
            Utc::now(),
        );
        assert_eq!(status.state, BuildState::Unknown);
    }

    #[test]
    fn running_uses_the_scheduled_build_time() {
        let scheduled = Utc::now() - chrono::Duration::minutes(2);
        let mut p = project(Activity::Building, BuildResult::Success);
        p.next_build_time = Some(scheduled);

        let polled_at = Utc::now();
        let status = status_from_project("api", &p, polled_at);
        assert_eq!(status.time, scheduled);
    }

    #[test]
    fn completed_polls_use_the_poll_instant() {
        let polled_at = Utc::now();
        let status = status_from_project(
            "api",
            &project(Activity::Sleeping, BuildResult::Success),
            polled_at,
        );
        assert_eq!(status.time, polled_at);
    }

    #[test]
    fn build_number_comes_from_trailing_digits() {
        assert_eq!(build_number_from_label("build.128"), 128);
        assert_eq!(build_number_from_label("1.0.0.128"), 128);
        assert_eq!(build_number_from_label("128"), 128);
        assert_eq!(build_number_from_label("nightly"), 0);
        assert_eq!(build_number_from_label(""), 0);
    }

    #[test]
    fn feed_payload_parses() {
        let json = r#"[{
            "name": "api-server",
            "activity": "Building",
            "lastBuildStatus": "Success",
            "lastBuildLabel": "build.13",
            "estimatedBuildDurationSeconds": 90,
            "messages": [{"text": "alice", "kind": "Breakers"}]
        }]"#;

        let feed: Vec<ProjectStatus> = serde_json::from_str(json).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].activity, Activity::Building);
        assert_eq!(feed[0].messages[0].kind, MessageKind::Breakers);

        let status = status_from_project("api", &feed[0], Utc::now());
        assert_eq!(status.state, BuildState::Running);
        assert_eq!(status.build_number, 13);
        assert_eq!(
            status.estimated_duration,
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn from_config_requires_address_and_project() {
        let cache = Arc::new(CruiseFeedCache::new());

        let missing_project = ConnectorConfig::new(KIND, "api")
            .with_setting("address", "http://ci.example.org");
        assert!(matches!(
            CruiseConnector::from_config(missing_project, Arc::clone(&cache)),
            Err(ConnectorError::Configuration(_))
        ));

        let missing_address =
            ConnectorConfig::new(KIND, "api").with_setting("project", "api-server");
        assert!(matches!(
            CruiseConnector::from_config(missing_address, cache),
            Err(ConnectorError::Configuration(_))
        ));
    }

    #[test]
    fn from_config_normalizes_the_server_address() {
        let cache = Arc::new(CruiseFeedCache::new());
        let config = ConnectorConfig::new(KIND, "api")
            .with_setting("address", "http://ci.example.org/")
            .with_setting("project", "api-server");

        let connector = CruiseConnector::from_config(config, cache).unwrap();
        assert_eq!(connector.server_address(), "http://ci.example.org");
        assert_eq!(connector.poll_interval(), DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn builder_custom_settings() {
        let cache = Arc::new(CruiseFeedCache::new());
        let connector = CruiseConnector::builder()
            .endpoint("http://ci.example.org")
            .project("api-server")
            .name("api build")
            .credentials("admin", "secret")
            .poll_interval(Duration::from_secs(30))
            .build(cache)
            .unwrap();

        assert_eq!(connector.name(), "api build");
        assert_eq!(connector.project(), "api-server");
        assert_eq!(connector.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn snapshots_require_a_build_identity() {
        let cache = Arc::new(CruiseFeedCache::new());
        let connector = CruiseConnector::builder()
            .endpoint("http://ci.example.org")
            .project("api-server")
            .build(cache)
            .unwrap();

        let with_identity = Status::builder("api").build_number(3).build();
        let without = Status::builder("api").build();
        assert!(connector.should_take_snapshot(&with_identity));
        assert!(!connector.should_take_snapshot(&without));
    }
}

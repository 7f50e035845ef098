//! Status - the result of one observation of a monitored source.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Observed state of a monitored source.
///
/// The enumeration is closed: a source that gave no usable signal is
/// `Unknown`, never a missing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BuildState {
    /// No usable signal from the source.
    #[default]
    Unknown,
    /// The last build completed successfully.
    Success,
    /// The last build failed, or a blocking diagnostic is present.
    Failure,
    /// The last build completed with non-fatal problems.
    Unstable,
    /// A build is currently in progress.
    Running,
}

impl BuildState {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            BuildState::Unknown => "?",
            BuildState::Success => "OK",
            BuildState::Failure => "FAIL",
            BuildState::Unstable => "WARN",
            BuildState::Running => "RUN",
        }
    }
}

/// The result of one poll of a monitored source.
///
/// A `Status` is created fresh on every poll (successful or not) and is never
/// mutated afterwards; the next poll supersedes it with a new instance. All
/// timestamps are UTC.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use buildwatch_types::{BuildState, Status};
///
/// let status = Status::builder("api-server")
///     .state(BuildState::Success)
///     .build_number(128)
///     .detail("all stages green")
///     .duration(Duration::from_secs(95))
///     .build();
///
/// assert_eq!(status.state, BuildState::Success);
/// assert_eq!(status.build_number, 128);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Status {
    /// Observed state.
    pub state: BuildState,

    /// Display name of the monitored source.
    pub name: String,

    /// Optional free-text detail (diagnostic messages, error text).
    pub detail: Option<String>,

    /// UTC instant this observation refers to.
    pub time: DateTime<Utc>,

    /// Source-defined identity of the underlying build. Zero means the
    /// source gave no build identity.
    pub build_number: u64,

    /// Duration of the underlying build, when the source reports one.
    pub duration: Option<Duration>,

    /// Estimated duration of the underlying build, when the source
    /// reports one.
    pub estimated_duration: Option<Duration>,
}

impl Status {
    /// Create a builder for constructing a status.
    pub fn builder(name: impl Into<String>) -> StatusBuilder {
        StatusBuilder::new(name)
    }

    /// A placeholder status for a source that has not been polled yet, or
    /// gave no usable signal.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// Whether a build is currently in progress.
    pub fn is_running(&self) -> bool {
        self.state == BuildState::Running
    }

    /// Whether this observation carries a build identity usable for
    /// history deduplication.
    pub fn has_build_identity(&self) -> bool {
        self.build_number != 0
    }
}

/// Builder for constructing `Status` instances.
#[derive(Debug)]
pub struct StatusBuilder {
    state: BuildState,
    name: String,
    detail: Option<String>,
    time: Option<DateTime<Utc>>,
    build_number: u64,
    duration: Option<Duration>,
    estimated_duration: Option<Duration>,
}

impl StatusBuilder {
    /// Create a new builder for the named source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: BuildState::Unknown,
            name: name.into(),
            detail: None,
            time: None,
            build_number: 0,
            duration: None,
            estimated_duration: None,
        }
    }

    /// Set the observed state (default: `Unknown`).
    pub fn state(mut self, state: BuildState) -> Self {
        self.state = state;
        self
    }

    /// Set the free-text detail.
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the observation instant (default: now, UTC).
    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the build identity.
    pub fn build_number(mut self, build_number: u64) -> Self {
        self.build_number = build_number;
        self
    }

    /// Set the reported build duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the reported estimated build duration.
    pub fn estimated_duration(mut self, estimated: Duration) -> Self {
        self.estimated_duration = Some(estimated);
        self
    }

    /// Build the status.
    pub fn build(self) -> Status {
        Status {
            state: self.state,
            name: self.name,
            detail: self.detail,
            time: self.time.unwrap_or_else(Utc::now),
            build_number: self.build_number,
            duration: self.duration,
            estimated_duration: self.estimated_duration,
        }
    }
}

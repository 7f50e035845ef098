//! # buildwatch
//!
//! A polling engine for watching CI build and health sources. Each monitored
//! source is a connector with its own polling interval; the scheduler drives
//! one independent loop per connector and fans events out to any number of
//! consumers, so a presentation layer can render current state and trends
//! without re-querying on every refresh.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Scheduler                            │
//! │   one loop per connector ──▶ events ──▶ subscribers          │
//! └───────────┬──────────────────────────────────────────────────┘
//!             │ query_status()
//! ┌───────────▼───────────┐     ┌──────────────────────────────┐
//! │       Connector       │────▶│  FeedCache (per server,      │
//! │  (cruise, ping, ...)  │     │  single-flight per window)   │
//! └───────────┬───────────┘     └──────────────────────────────┘
//!             │ commit
//! ┌───────────▼───────────┐
//! │  Status + Snapshots   │  (bounded, deduplicated history)
//! └───────────────────────┘
//! ```
//!
//! - **[`scheduler`]**: interval-based polling with cooperative start/stop
//!   and event fan-out
//! - **[`registry`]**: explicit mapping from a type discriminator to a
//!   connector factory
//! - **`buildwatch-connectors`**: the [`Connector`](buildwatch_connectors::Connector)
//!   capability set and the built-in cruise/ping connectors
//! - **`buildwatch-types`**: the `Status`/`Snapshot` schema shared with
//!   consumers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use buildwatch::{ConnectorRegistry, Scheduler, SchedulerEvent};
//! use buildwatch_connectors::cruise::{self, CruiseFeedCache};
//! use buildwatch_connectors::{Connector, ConnectorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = ConnectorRegistry::new();
//!     registry.register(cruise::KIND, cruise::factory(Arc::new(CruiseFeedCache::new())));
//!
//!     let config = ConnectorConfig::new(cruise::KIND, "api build")
//!         .with_setting("address", "http://ci.example.org")
//!         .with_setting("project", "api-server");
//!
//!     let scheduler = Scheduler::new();
//!     scheduler.observe(registry.create(config)?);
//!
//!     let mut events = scheduler.subscribe();
//!     scheduler.start()?;
//!     while let Ok(event) = events.recv().await {
//!         if let SchedulerEvent::StatusQueried(connector) = event {
//!             let status = connector.current_status();
//!             println!("{} {}", status.state.symbol(), connector.name());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod registry;
pub mod scheduler;

pub use registry::{ConnectorFactory, ConnectorRegistry};
pub use scheduler::{Scheduler, SchedulerBuilder, SchedulerError, SchedulerEvent};

// Re-export the member crates for consumers that only depend on the engine.
pub use buildwatch_connectors as connectors;
pub use buildwatch_types as types;

//! # buildwatch-types
//!
//! Core types for build and health monitoring. This crate defines the schema
//! shared between source connectors, the polling engine, and any presentation
//! layer that renders current state and trends.
//!
//! ## Design Goals
//!
//! - **Dependency-light**: only `chrono` for UTC instants
//! - **Optional serialization**: enable the `serde` feature as needed
//! - **Source agnostic**: works for CI servers, reachability probes, or
//!   custom sources
//! - **Closed state enumeration**: absence of information is `Unknown`,
//!   never a missing value
//!
//! ## Example
//!
//! ```rust
//! use buildwatch_types::{BuildState, SnapshotHistory, Status};
//!
//! let mut history = SnapshotHistory::new(3);
//!
//! let status = Status::builder("api-server")
//!     .state(BuildState::Success)
//!     .build_number(42)
//!     .build();
//! history.add_or_update(status);
//!
//! assert_eq!(history.len(), 1);
//! assert_eq!(history.latest().unwrap().status.build_number, 42);
//! ```

mod history;
mod status;

pub use history::*;
pub use status::*;

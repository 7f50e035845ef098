//! Shared per-connector observation state.

use buildwatch_types::{SnapshotHistory, Status};
use parking_lot::RwLock;

/// Current status and bounded history for one connector.
///
/// The owning connector's polling loop is the only writer; presentation
/// layers read concurrently, so both pieces sit behind `RwLock`.
#[derive(Debug)]
pub struct ConnectorState {
    current: RwLock<Status>,
    history: RwLock<SnapshotHistory>,
}

impl ConnectorState {
    /// Create state for the named source with the given history capacity.
    ///
    /// The current status starts as `Unknown` so there is always something
    /// to display before the first poll completes.
    pub fn new(name: &str, max_snapshots: usize) -> Self {
        Self {
            current: RwLock::new(Status::unknown(name)),
            history: RwLock::new(SnapshotHistory::new(max_snapshots)),
        }
    }

    /// The latest committed status.
    pub fn current_status(&self) -> Status {
        self.current.read().clone()
    }

    /// A read-only copy of the recorded history, oldest first.
    pub fn snapshots(&self) -> Vec<buildwatch_types::Snapshot> {
        self.history.read().entries().to_vec()
    }

    /// Number of recorded history entries.
    pub fn snapshot_count(&self) -> usize {
        self.history.read().len()
    }

    /// Commit one poll result: record it into the history when the owning
    /// connector's policy says so, then replace the current status.
    pub fn commit(&self, status: Status, take_snapshot: bool) {
        if take_snapshot {
            self.history.write().add_or_update(status.clone());
        }
        *self.current.write() = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildwatch_types::BuildState;

    #[test]
    fn starts_unknown_and_empty() {
        let state = ConnectorState::new("svc", 3);
        assert_eq!(state.current_status().state, BuildState::Unknown);
        assert_eq!(state.current_status().name, "svc");
        assert_eq!(state.snapshot_count(), 0);
    }

    #[test]
    fn commit_replaces_current() {
        let state = ConnectorState::new("svc", 3);
        let status = Status::builder("svc").state(BuildState::Success).build();

        state.commit(status, false);
        assert_eq!(state.current_status().state, BuildState::Success);
        assert_eq!(state.snapshot_count(), 0);
    }

    #[test]
    fn commit_records_history_only_when_asked() {
        let state = ConnectorState::new("svc", 3);

        let first = Status::builder("svc")
            .state(BuildState::Success)
            .build_number(1)
            .build();
        state.commit(first, true);

        let second = Status::builder("svc").state(BuildState::Failure).build();
        state.commit(second, false);

        assert_eq!(state.snapshot_count(), 1);
        assert_eq!(state.current_status().state, BuildState::Failure);
        assert_eq!(state.snapshots()[0].status.build_number, 1);
    }
}

//! Bounded, deduplicated history of recorded statuses.

use chrono::{DateTime, Utc};

use crate::Status;

/// Default capacity for a connector's snapshot history.
pub const DEFAULT_MAX_SNAPSHOTS: usize = 32;

/// One recorded historical entry: a status frozen at the moment it entered
/// the history.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// UTC instant the entry was recorded.
    pub recorded_at: DateTime<Utc>,

    /// The status as observed.
    pub status: Status,
}

impl Snapshot {
    /// Record a status now.
    pub fn new(status: Status) -> Self {
        Self {
            recorded_at: Utc::now(),
            status,
        }
    }
}

/// An ordered, capacity-bounded history of snapshots for one source.
///
/// Entries are identified by `Status::build_number`: recording a status whose
/// build number already appears in the history replaces that entry in place,
/// so a build first seen while running is corrected once its final result is
/// known. Statuses with build number zero carry no identity and are always
/// appended. When the capacity is exceeded the oldest entry is evicted first.
///
/// # Example
///
/// ```rust
/// use buildwatch_types::{BuildState, SnapshotHistory, Status};
///
/// let mut history = SnapshotHistory::new(3);
/// for n in 1..=4 {
///     history.add_or_update(
///         Status::builder("svc").state(BuildState::Success).build_number(n).build(),
///     );
/// }
///
/// // Capacity 3: build 1 was evicted.
/// let numbers: Vec<u64> = history.iter().map(|s| s.status.build_number).collect();
/// assert_eq!(numbers, vec![2, 3, 4]);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapshotHistory {
    entries: Vec<Snapshot>,
    max_snapshots: usize,
}

impl SnapshotHistory {
    /// Create an empty history holding at most `max_snapshots` entries.
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_snapshots,
        }
    }

    /// The capacity bound.
    pub fn max_snapshots(&self) -> usize {
        self.max_snapshots
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The recorded entries, oldest first.
    pub fn entries(&self) -> &[Snapshot] {
        &self.entries
    }

    /// Iterate over entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter()
    }

    /// The most recently recorded entry.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.last()
    }

    /// Record a status, replacing an existing entry with the same build
    /// number in place, appending otherwise, and evicting the oldest entry
    /// once the capacity bound is exceeded.
    ///
    /// The history is rebuilt and swapped in one step rather than edited
    /// index-by-index.
    pub fn add_or_update(&mut self, status: Status) {
        let replace_at = if status.has_build_identity() {
            self.entries
                .iter()
                .position(|s| s.status.build_number == status.build_number)
        } else {
            None
        };

        let mut next = Vec::with_capacity(self.entries.len() + 1);
        match replace_at {
            Some(at) => {
                for (i, entry) in self.entries.iter().enumerate() {
                    if i == at {
                        next.push(Snapshot::new(status.clone()));
                    } else {
                        next.push(entry.clone());
                    }
                }
            }
            None => {
                next.extend(self.entries.iter().cloned());
                next.push(Snapshot::new(status));
            }
        }
        while next.len() > self.max_snapshots {
            next.remove(0);
        }

        self.entries = next;
    }
}

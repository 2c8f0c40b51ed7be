//! Per-run tallies and per-snapshot outcomes.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::CloudError;

/// What reconciliation did for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LockAction {
    /// Young snapshot without a lock; a lock was created.
    Added { lock_name: String },
    /// Young snapshot already carrying a lock.
    AlreadyLocked { lock_name: String },
    /// Old snapshot carrying locks; every one of them was deleted.
    Removed { lock_names: Vec<String> },
    /// Old snapshot without a lock.
    NothingToRemove,
}

/// Outcome of reconciling one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotOutcome {
    pub snapshot: String,
    /// Whole hours since creation at the time of the run.
    pub age_hours: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<LockAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SnapshotOutcome {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Counts and outcomes of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub resource_group: String,
    pub processed: usize,
    pub locks_added: usize,
    pub locks_removed: usize,
    pub errors: usize,
    pub outcomes: Vec<SnapshotOutcome>,
}

impl RunSummary {
    pub fn new(resource_group: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            ..Self::default()
        }
    }

    /// Fold one snapshot's result into the tallies.
    ///
    /// `locks_removed` counts deleted locks, not snapshots.
    pub fn record(
        &mut self,
        snapshot: &str,
        age: TimeDelta,
        result: Result<LockAction, CloudError>,
    ) {
        self.processed += 1;

        let (action, error) = match result {
            Ok(action) => {
                match &action {
                    LockAction::Added { .. } => self.locks_added += 1,
                    LockAction::Removed { lock_names } => self.locks_removed += lock_names.len(),
                    LockAction::AlreadyLocked { .. } | LockAction::NothingToRemove => {}
                }
                (Some(action), None)
            }
            Err(e) => {
                self.errors += 1;
                (None, Some(e.to_string()))
            }
        };

        self.outcomes.push(SnapshotOutcome {
            snapshot: snapshot.to_string(),
            age_hours: age.num_hours(),
            action,
            error,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Outcomes that ended in an error.
    pub fn failures(&self) -> impl Iterator<Item = &SnapshotOutcome> {
        self.outcomes.iter().filter(|o| o.is_error())
    }
}

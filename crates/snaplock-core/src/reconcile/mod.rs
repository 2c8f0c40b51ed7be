//! Age-based reconciliation of snapshot deletion locks.
//!
//! Snapshots younger than the retention threshold must carry a
//! `CanNotDelete` lock; older snapshots must carry none, so that the
//! lifecycle cleanup can delete them. Each snapshot is converged
//! independently and a failure on one never stops the others.

mod summary;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};

use crate::cloud::CloudResourceApi;
use crate::error::{CloudError, ReconcileError};
use crate::types::{DEFAULT_LOCK_NAME, LockLevel, ResourceLock, ResourceRef, Snapshot};

pub use summary::{LockAction, RunSummary, SnapshotOutcome};

/// Snapshots stay locked for this many days after creation.
pub const DEFAULT_RETENTION_DAYS: i64 = 2;

/// Upper bound on locks deleted from one snapshot in a single run.
pub const MAX_LOCKS_PER_SNAPSHOT: usize = 16;

pub fn default_threshold() -> TimeDelta {
    TimeDelta::days(DEFAULT_RETENTION_DAYS)
}

/// Parameters of one reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub resource_group: String,
    /// Name given to locks this run creates.
    pub lock_name: String,
    /// Age at which a snapshot loses its lock.
    pub threshold: TimeDelta,
    /// Note attached to created locks; a default note is used when unset.
    pub lock_note: Option<String>,
}

impl ReconcileOptions {
    pub fn new(resource_group: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            lock_name: DEFAULT_LOCK_NAME.to_string(),
            threshold: default_threshold(),
            lock_note: None,
        }
    }

    pub fn with_lock_name(mut self, lock_name: impl Into<String>) -> Self {
        self.lock_name = lock_name.into();
        self
    }

    pub fn with_threshold(mut self, threshold: TimeDelta) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_lock_note(mut self, note: impl Into<String>) -> Self {
        self.lock_note = Some(note.into());
        self
    }

    /// Note attached to created locks.
    pub fn note(&self) -> String {
        match &self.lock_note {
            Some(note) => note.clone(),
            None => format!(
                "Auto-applied lock: snapshot is younger than {}; removed automatically after that age.",
                format_age(self.threshold)
            ),
        }
    }
}

/// Lock state a snapshot should be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredLock {
    Locked,
    Unlocked,
}

/// Snapshots created strictly after `cutoff` are young and stay locked.
/// A snapshot created exactly at the cutoff is already old.
pub fn desired_lock(time_created: DateTime<Utc>, cutoff: DateTime<Utc>) -> DesiredLock {
    if time_created > cutoff {
        DesiredLock::Locked
    } else {
        DesiredLock::Unlocked
    }
}

/// Render an age as `2d 3h`, `5h 12m` or `40m`.
pub fn format_age(age: TimeDelta) -> String {
    let minutes = age.num_minutes().max(0);
    let (days, hours, minutes) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}

/// Time reference shared by every snapshot of one run.
#[derive(Debug, Clone, Copy)]
struct RunClock {
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
}

impl RunClock {
    fn new(now: DateTime<Utc>, threshold: TimeDelta) -> Self {
        Self {
            now,
            cutoff: now - threshold,
        }
    }

    fn age_of(&self, snapshot: &Snapshot) -> TimeDelta {
        self.now - snapshot.time_created
    }
}

/// Converges snapshot locks through a [`CloudResourceApi`].
#[derive(Debug)]
pub struct Reconciler<A> {
    api: A,
}

impl<A: CloudResourceApi> Reconciler<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Run one reconciliation pass against the current time.
    pub fn run(&mut self, options: &ReconcileOptions) -> Result<RunSummary, ReconcileError> {
        self.authenticate()?;
        self.reconcile(options, Utc::now())
    }

    /// Run one reconciliation pass with `now` as the time reference.
    pub fn run_at(
        &mut self,
        options: &ReconcileOptions,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, ReconcileError> {
        self.authenticate()?;
        self.reconcile(options, now)
    }

    fn authenticate(&mut self) -> Result<(), ReconcileError> {
        self.api.authenticate().map_err(ReconcileError::Auth)
    }

    fn reconcile(
        &mut self,
        options: &ReconcileOptions,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, ReconcileError> {
        let clock = RunClock::new(now, options.threshold);
        let resource_group = options.resource_group.as_str();

        let snapshots = self
            .api
            .list_snapshots(resource_group)
            .map_err(|source| ReconcileError::List {
                resource_group: resource_group.to_string(),
                source,
            })?;

        info!(
            resource_group,
            count = snapshots.len(),
            cutoff = %clock.cutoff.to_rfc3339(),
            "Reconciling snapshot locks"
        );

        let note = options.note();
        let mut summary = RunSummary::new(resource_group);

        for snapshot in &snapshots {
            let age = clock.age_of(snapshot);
            let result = self.reconcile_snapshot(snapshot, &clock, options, &note);
            if let Err(e) = &result {
                warn!(snapshot = %snapshot.name, error = %e, "Failed to reconcile snapshot lock");
            }
            summary.record(&snapshot.name, age, result);
        }

        info!(
            processed = summary.processed,
            locks_added = summary.locks_added,
            locks_removed = summary.locks_removed,
            errors = summary.errors,
            "Reconciliation finished"
        );
        if summary.has_errors() {
            warn!(
                errors = summary.errors,
                "Some snapshots could not be reconciled and were left as found"
            );
        }

        Ok(summary)
    }

    fn reconcile_snapshot(
        &mut self,
        snapshot: &Snapshot,
        clock: &RunClock,
        options: &ReconcileOptions,
        note: &str,
    ) -> Result<LockAction, CloudError> {
        let age = format_age(clock.age_of(snapshot));
        let target = snapshot.resource_ref();
        let existing = self.api.get_lock(&target)?;

        match (desired_lock(snapshot.time_created, clock.cutoff), existing) {
            (DesiredLock::Locked, Some(lock)) => {
                info!(
                    snapshot = %snapshot.name,
                    %age,
                    lock = %lock.name,
                    "Snapshot already locked"
                );
                Ok(LockAction::AlreadyLocked {
                    lock_name: lock.name,
                })
            }
            (DesiredLock::Locked, None) => {
                let lock = self.api.create_lock(
                    &target,
                    &options.lock_name,
                    LockLevel::CanNotDelete,
                    note,
                )?;
                info!(snapshot = %snapshot.name, %age, lock = %lock.name, "Added lock");
                Ok(LockAction::Added {
                    lock_name: lock.name,
                })
            }
            (DesiredLock::Unlocked, Some(lock)) => {
                let lock_names = self.remove_locks(snapshot, &target, lock, &age)?;
                Ok(LockAction::Removed { lock_names })
            }
            (DesiredLock::Unlocked, None) => {
                info!(snapshot = %snapshot.name, %age, "Snapshot past retention, no lock present");
                Ok(LockAction::NothingToRemove)
            }
        }
    }

    /// Delete `first` and then every further lock the lookup still reports.
    ///
    /// A lock reappearing under a name already deleted, or more than
    /// [`MAX_LOCKS_PER_SNAPSHOT`] locks, ends the loop with an error.
    fn remove_locks(
        &mut self,
        snapshot: &Snapshot,
        target: &ResourceRef,
        first: ResourceLock,
        age: &str,
    ) -> Result<Vec<String>, CloudError> {
        let mut removed: Vec<String> = Vec::new();
        let mut next = Some(first);

        while let Some(lock) = next.take() {
            if removed.contains(&lock.name) {
                return Err(CloudError::lock_delete(
                    target,
                    &lock.name,
                    "lock is still present after it was deleted",
                ));
            }
            if removed.len() >= MAX_LOCKS_PER_SNAPSHOT {
                return Err(CloudError::lock_delete(
                    target,
                    &lock.name,
                    format!("more than {MAX_LOCKS_PER_SNAPSHOT} locks on the snapshot"),
                ));
            }

            self.api.delete_lock(target, &lock.name)?;
            info!(snapshot = %snapshot.name, %age, lock = %lock.name, "Removed lock");
            removed.push(lock.name);
            next = self.api.get_lock(target)?;
        }

        Ok(removed)
    }
}

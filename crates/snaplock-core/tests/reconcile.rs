//! Reconciliation tests against an in-memory cloud.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use snaplock_core::prelude::*;

/// In-memory Cloud Resource API with failure injection and a call log.
#[derive(Debug, Default)]
struct FakeCloud {
    snapshots: Vec<Snapshot>,
    /// Locks per snapshot name, in the order the lookup reports them.
    locks: HashMap<String, Vec<ResourceLock>>,
    fail_auth: bool,
    fail_list: bool,
    fail_create: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_lookup: HashSet<String>,
    /// Lock names whose delete reports success but leaves the lock in place.
    undeletable: HashSet<String>,
    calls: RefCell<Vec<String>>,
}

impl FakeCloud {
    fn with_snapshot(mut self, name: &str, time_created: DateTime<Utc>) -> Self {
        self.snapshots.push(Snapshot::new(name, "rg", time_created));
        self
    }

    fn with_lock(mut self, snapshot: &str, lock_name: &str) -> Self {
        let target = ResourceRef::new(SNAPSHOT_RESOURCE_TYPE, snapshot, "rg");
        self.locks
            .entry(snapshot.to_string())
            .or_default()
            .push(ResourceLock {
                name: lock_name.to_string(),
                target,
                level: LockLevel::CanNotDelete,
                notes: None,
            });
        self
    }

    fn lock_on(&self, snapshot: &str) -> Option<&ResourceLock> {
        self.locks.get(snapshot).and_then(|locks| locks.first())
    }

    fn lock_names_on(&self, snapshot: &str) -> Vec<&str> {
        self.locks
            .get(snapshot)
            .map(|locks| locks.iter().map(|l| l.name.as_str()).collect())
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl CloudResourceApi for FakeCloud {
    fn authenticate(&mut self) -> Result<(), CloudError> {
        self.record("authenticate".to_string());
        if self.fail_auth {
            return Err(CloudError::auth("identity endpoint unreachable"));
        }
        Ok(())
    }

    fn list_snapshots(&self, resource_group: &str) -> Result<Vec<Snapshot>, CloudError> {
        self.record(format!("list {resource_group}"));
        if self.fail_list {
            return Err(CloudError::list(resource_group, "HTTP 404 Not Found"));
        }
        Ok(self
            .snapshots
            .iter()
            .filter(|s| s.resource_group == resource_group)
            .cloned()
            .collect())
    }

    fn get_lock(&self, target: &ResourceRef) -> Result<Option<ResourceLock>, CloudError> {
        self.record(format!("get_lock {}", target.resource_name));
        if self.fail_lookup.contains(&target.resource_name) {
            return Err(CloudError::lock_lookup(target, "HTTP 500"));
        }
        Ok(self.lock_on(&target.resource_name).cloned())
    }

    fn create_lock(
        &mut self,
        target: &ResourceRef,
        lock_name: &str,
        level: LockLevel,
        notes: &str,
    ) -> Result<ResourceLock, CloudError> {
        self.record(format!("create {} {}", target.resource_name, lock_name));
        if self.fail_create.contains(&target.resource_name) {
            return Err(CloudError::lock_create(target, lock_name, "HTTP 403"));
        }
        let lock = ResourceLock {
            name: lock_name.to_string(),
            target: target.clone(),
            level,
            notes: Some(notes.to_string()),
        };
        self.locks
            .entry(target.resource_name.clone())
            .or_default()
            .push(lock.clone());
        Ok(lock)
    }

    fn delete_lock(&mut self, target: &ResourceRef, lock_name: &str) -> Result<(), CloudError> {
        self.record(format!("delete {} {}", target.resource_name, lock_name));
        if self.fail_delete.contains(&target.resource_name) {
            return Err(CloudError::lock_delete(target, lock_name, "HTTP 409"));
        }
        if self.undeletable.contains(lock_name) {
            return Ok(());
        }
        let locks = self.locks.entry(target.resource_name.clone()).or_default();
        match locks.iter().position(|l| l.name == lock_name) {
            Some(index) => {
                locks.remove(index);
                Ok(())
            }
            None => Err(CloudError::lock_delete(target, lock_name, "HTTP 404")),
        }
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

fn options() -> ReconcileOptions {
    ReconcileOptions::new("rg")
}

#[test]
fn test_mixed_age_scenario() {
    let mut cloud = FakeCloud::default()
        .with_snapshot("A", now() - TimeDelta::hours(1))
        .with_snapshot("B", now() - TimeDelta::days(5))
        .with_snapshot("C", now() - TimeDelta::days(3))
        .with_lock("B", "manual-lock");

    let summary = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.locks_added, 1);
    assert_eq!(summary.locks_removed, 1);
    assert_eq!(summary.errors, 0);

    let a = cloud.lock_on("A").expect("A should be locked");
    assert_eq!(a.name, DEFAULT_LOCK_NAME);
    assert_eq!(a.level, LockLevel::CanNotDelete);
    assert!(a.notes.as_deref().unwrap_or_default().contains("2d"));
    assert!(cloud.lock_on("B").is_none());
    assert!(cloud.lock_on("C").is_none());

    assert_eq!(
        cloud.calls(),
        vec![
            "authenticate",
            "list rg",
            "get_lock A",
            "create A AutoSnapshot-CannotDelete",
            "get_lock B",
            "delete B manual-lock",
            "get_lock B",
            "get_lock C",
        ]
    );

    let actions: Vec<Option<LockAction>> =
        summary.outcomes.iter().map(|o| o.action.clone()).collect();
    assert_eq!(
        actions,
        vec![
            Some(LockAction::Added {
                lock_name: DEFAULT_LOCK_NAME.to_string()
            }),
            Some(LockAction::Removed {
                lock_names: vec!["manual-lock".to_string()]
            }),
            Some(LockAction::NothingToRemove),
        ]
    );
}

#[test]
fn test_second_run_is_idempotent() {
    let mut cloud = FakeCloud::default()
        .with_snapshot("young", now() - TimeDelta::hours(6))
        .with_snapshot("old", now() - TimeDelta::days(4))
        .with_lock("old", "AutoSnapshot-CannotDelete");

    let first = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap();
    assert_eq!((first.locks_added, first.locks_removed), (1, 1));

    let second = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap();
    assert_eq!(second.processed, 2);
    assert_eq!(second.locks_added, 0);
    assert_eq!(second.locks_removed, 0);
    assert_eq!(second.errors, 0);
    assert_eq!(
        second.outcomes[0].action,
        Some(LockAction::AlreadyLocked {
            lock_name: "AutoSnapshot-CannotDelete".to_string()
        })
    );
}

#[test]
fn test_lock_state_matches_threshold_after_run() {
    let ages = [
        TimeDelta::minutes(5),
        TimeDelta::hours(47),
        TimeDelta::days(2),
        TimeDelta::days(2) + TimeDelta::seconds(1),
        TimeDelta::days(30),
    ];
    let mut cloud = FakeCloud::default();
    for (i, age) in ages.iter().enumerate() {
        let name = format!("snap-{i}");
        cloud = cloud.with_snapshot(&name, now() - *age);
        if i % 2 == 0 {
            cloud = cloud.with_lock(&name, "other");
        }
    }

    let summary = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap();
    assert_eq!(summary.errors, 0);

    let cutoff = now() - TimeDelta::days(2);
    for snapshot in &cloud.snapshots {
        assert_eq!(
            snapshot.time_created > cutoff,
            cloud.lock_on(&snapshot.name).is_some(),
            "lock state of {}",
            snapshot.name
        );
    }
}

#[test]
fn test_snapshot_at_cutoff_loses_lock() {
    let mut cloud = FakeCloud::default()
        .with_snapshot("edge", now() - TimeDelta::days(2))
        .with_lock("edge", "AutoSnapshot-CannotDelete");

    let summary = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap();

    assert_eq!(summary.locks_removed, 1);
    assert!(cloud.lock_on("edge").is_none());
}

#[test]
fn test_failures_are_isolated_per_snapshot() {
    let mut cloud = FakeCloud::default()
        .with_snapshot("s1", now() - TimeDelta::hours(1))
        .with_snapshot("s2", now() - TimeDelta::hours(2))
        .with_snapshot("s3", now() - TimeDelta::days(3))
        .with_snapshot("s4", now() - TimeDelta::days(4))
        .with_snapshot("s5", now() - TimeDelta::hours(3))
        .with_lock("s3", "manual-lock")
        .with_lock("s4", "manual-lock");
    cloud.fail_create.insert("s1".to_string());
    cloud.fail_delete.insert("s3".to_string());
    cloud.fail_lookup.insert("s5".to_string());

    let summary = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap();

    assert_eq!(summary.processed, 5);
    assert_eq!(summary.errors, 3);
    assert_eq!(summary.locks_added, 1);
    assert_eq!(summary.locks_removed, 1);

    let failed: Vec<&str> = summary.failures().map(|o| o.snapshot.as_str()).collect();
    assert_eq!(failed, vec!["s1", "s3", "s5"]);
    assert!(summary.outcomes[0].error.as_deref().unwrap().contains("HTTP 403"));

    // Failing snapshots are left as found.
    assert!(cloud.lock_on("s1").is_none());
    assert_eq!(cloud.lock_on("s3").unwrap().name, "manual-lock");
    assert!(cloud.lock_on("s5").is_none());
    // Later snapshots still converge.
    assert!(cloud.lock_on("s2").is_some());
    assert!(cloud.lock_on("s4").is_none());
}

#[test]
fn test_empty_resource_group() {
    let mut cloud = FakeCloud::default();

    let summary = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap();

    assert_eq!(summary, RunSummary::new("rg"));
    assert!(!summary.has_errors());
}

#[test]
fn test_auth_failure_short_circuits() {
    let mut cloud = FakeCloud::default()
        .with_snapshot("young", now() - TimeDelta::hours(1))
        .with_snapshot("old", now() - TimeDelta::days(9))
        .with_lock("old", "manual-lock");
    cloud.fail_auth = true;

    let err = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Auth(_)));
    assert_eq!(cloud.calls(), vec!["authenticate"]);
    assert!(cloud.lock_on("young").is_none());
    assert!(cloud.lock_on("old").is_some());
}

#[test]
fn test_list_failure_is_fatal() {
    let mut cloud = FakeCloud::default().with_snapshot("young", now() - TimeDelta::hours(1));
    cloud.fail_list = true;

    let err = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap_err();

    match err {
        ReconcileError::List { resource_group, .. } => assert_eq!(resource_group, "rg"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(cloud.lock_on("young").is_none());
    assert_eq!(cloud.calls(), vec!["authenticate", "list rg"]);
}

#[test]
fn test_every_lock_removed_from_old_snapshot() {
    let mut cloud = FakeCloud::default()
        .with_snapshot("old", now() - TimeDelta::days(5))
        .with_snapshot("young", now() - TimeDelta::hours(2))
        .with_lock("old", "manual-lock")
        .with_lock("old", "AutoSnapshot-CannotDelete")
        .with_lock("young", "manual-lock")
        .with_lock("young", "legal-hold");

    let first = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap();

    assert_eq!(first.errors, 0);
    assert_eq!(first.locks_removed, 2);
    assert_eq!(first.locks_added, 0);
    assert_eq!(
        first.outcomes[0].action,
        Some(LockAction::Removed {
            lock_names: vec![
                "manual-lock".to_string(),
                "AutoSnapshot-CannotDelete".to_string()
            ]
        })
    );
    assert!(cloud.lock_names_on("old").is_empty());
    // Young snapshots keep whatever locks they already carry.
    assert_eq!(cloud.lock_names_on("young"), vec!["manual-lock", "legal-hold"]);

    let second = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap();
    assert_eq!(second.locks_removed, 0);
    assert_eq!(second.locks_added, 0);
    assert_eq!(second.outcomes[0].action, Some(LockAction::NothingToRemove));
}

#[test]
fn test_lock_surviving_delete_is_an_error() {
    let mut cloud = FakeCloud::default()
        .with_snapshot("old", now() - TimeDelta::days(3))
        .with_snapshot("older", now() - TimeDelta::days(4))
        .with_lock("old", "sticky")
        .with_lock("older", "manual-lock");
    cloud.undeletable.insert("sticky".to_string());

    let summary = Reconciler::new(&mut cloud)
        .run_at(&options(), now())
        .unwrap();

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.locks_removed, 1);
    let error = summary.outcomes[0].error.as_deref().unwrap();
    assert!(error.contains("sticky"), "{error}");
    assert!(error.contains("still present"), "{error}");
    // One delete attempt, no retry loop.
    let deletes = cloud
        .calls()
        .iter()
        .filter(|c| c.as_str() == "delete old sticky")
        .count();
    assert_eq!(deletes, 1);
    assert!(cloud.lock_names_on("older").is_empty());
}

#[test]
fn test_custom_lock_name_and_threshold() {
    let mut cloud = FakeCloud::default()
        .with_snapshot("recent", now() - TimeDelta::hours(10))
        .with_snapshot("stale", now() - TimeDelta::hours(13));
    let options = options()
        .with_lock_name("keep-me")
        .with_threshold(TimeDelta::hours(12))
        .with_lock_note("held by nightly job");

    let summary = Reconciler::new(&mut cloud).run_at(&options, now()).unwrap();

    assert_eq!(summary.locks_added, 1);
    let lock = cloud.lock_on("recent").unwrap();
    assert_eq!(lock.name, "keep-me");
    assert_eq!(lock.notes.as_deref(), Some("held by nightly job"));
    assert!(cloud.lock_on("stale").is_none());
}

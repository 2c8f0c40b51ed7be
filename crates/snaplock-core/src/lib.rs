//! Snaplock Core Library
//!
//! Keeps deletion locks on young disk snapshots and releases them once a
//! snapshot passes the retention threshold, so lifecycle cleanup can run.

pub mod cloud;
pub mod error;
pub mod reconcile;
pub mod settings;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Cloud
    pub use crate::cloud::{AzureClient, CloudResourceApi, ManagedIdentity};

    // Errors
    pub use crate::error::{CloudError, ReconcileError};

    // Reconciliation
    pub use crate::reconcile::{
        LockAction, ReconcileOptions, Reconciler, RunSummary, SnapshotOutcome,
    };

    // Settings
    pub use crate::settings::Settings;

    // Types
    pub use crate::types::{
        DEFAULT_LOCK_NAME, LockLevel, ResourceLock, ResourceRef, SNAPSHOT_RESOURCE_TYPE, Snapshot,
    };
}

//! Error types for cloud operations and reconciliation runs.

use thiserror::Error;

use crate::types::ResourceRef;

/// Failure of a single Cloud Resource API call.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("failed to list snapshots in resource group '{resource_group}': {message}")]
    List {
        resource_group: String,
        message: String,
    },

    #[error("failed to read locks on {target}: {message}")]
    LockLookup { target: ResourceRef, message: String },

    #[error("failed to create lock '{lock_name}' on {target}: {message}")]
    LockCreate {
        target: ResourceRef,
        lock_name: String,
        message: String,
    },

    #[error("failed to delete lock '{lock_name}' on {target}: {message}")]
    LockDelete {
        target: ResourceRef,
        lock_name: String,
        message: String,
    },
}

impl CloudError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn list(resource_group: impl Into<String>, message: impl Into<String>) -> Self {
        Self::List {
            resource_group: resource_group.into(),
            message: message.into(),
        }
    }

    pub fn lock_lookup(target: &ResourceRef, message: impl Into<String>) -> Self {
        Self::LockLookup {
            target: target.clone(),
            message: message.into(),
        }
    }

    pub fn lock_create(
        target: &ResourceRef,
        lock_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::LockCreate {
            target: target.clone(),
            lock_name: lock_name.into(),
            message: message.into(),
        }
    }

    pub fn lock_delete(
        target: &ResourceRef,
        lock_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::LockDelete {
            target: target.clone(),
            lock_name: lock_name.into(),
            message: message.into(),
        }
    }
}

/// Failures that make a whole reconciliation run meaningless.
///
/// Per-snapshot failures never surface here; they are tallied in the
/// [`RunSummary`](crate::reconcile::RunSummary).
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("could not authenticate with the managed identity")]
    Auth(#[source] CloudError),

    #[error("could not list snapshots in resource group '{resource_group}'")]
    List {
        resource_group: String,
        #[source]
        source: CloudError,
    },
}

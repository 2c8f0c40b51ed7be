//! Cloud Resource API seam.
//!
//! The reconciler only talks to the platform through [`CloudResourceApi`]:
//! - [`azure::AzureClient`] speaks the Azure Resource Manager REST API
//! - tests substitute an in-memory implementation

pub mod arm;
pub mod azure;
pub mod identity;

use crate::error::CloudError;
use crate::types::{LockLevel, ResourceLock, ResourceRef, Snapshot};

pub use azure::AzureClient;
pub use identity::ManagedIdentity;

/// Operations the reconciler consumes from the cloud platform.
///
/// All calls are blocking. A missing lock is `Ok(None)` from
/// [`get_lock`](CloudResourceApi::get_lock), never an error.
pub trait CloudResourceApi {
    /// Establish an identity-based session.
    fn authenticate(&mut self) -> Result<(), CloudError>;

    /// List every snapshot in a resource group, in platform order.
    fn list_snapshots(&self, resource_group: &str) -> Result<Vec<Snapshot>, CloudError>;

    /// Return a lock attached to `target`, whatever its name.
    fn get_lock(&self, target: &ResourceRef) -> Result<Option<ResourceLock>, CloudError>;

    /// Create (or overwrite) the lock named `lock_name` on `target`.
    fn create_lock(
        &mut self,
        target: &ResourceRef,
        lock_name: &str,
        level: LockLevel,
        notes: &str,
    ) -> Result<ResourceLock, CloudError>;

    /// Delete the lock named `lock_name` from `target`.
    fn delete_lock(&mut self, target: &ResourceRef, lock_name: &str) -> Result<(), CloudError>;
}

impl<T: CloudResourceApi + ?Sized> CloudResourceApi for &mut T {
    fn authenticate(&mut self) -> Result<(), CloudError> {
        (**self).authenticate()
    }

    fn list_snapshots(&self, resource_group: &str) -> Result<Vec<Snapshot>, CloudError> {
        (**self).list_snapshots(resource_group)
    }

    fn get_lock(&self, target: &ResourceRef) -> Result<Option<ResourceLock>, CloudError> {
        (**self).get_lock(target)
    }

    fn create_lock(
        &mut self,
        target: &ResourceRef,
        lock_name: &str,
        level: LockLevel,
        notes: &str,
    ) -> Result<ResourceLock, CloudError> {
        (**self).create_lock(target, lock_name, level, notes)
    }

    fn delete_lock(&mut self, target: &ResourceRef, lock_name: &str) -> Result<(), CloudError> {
        (**self).delete_lock(target, lock_name)
    }
}

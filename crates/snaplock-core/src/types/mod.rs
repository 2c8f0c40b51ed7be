//! Shared core types used across the cloud API and reconciler layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ARM resource type of managed disk snapshots.
pub const SNAPSHOT_RESOURCE_TYPE: &str = "Microsoft.Compute/snapshots";

/// Default name of the lock created on young snapshots.
pub const DEFAULT_LOCK_NAME: &str = "AutoSnapshot-CannotDelete";

/// A point-in-time copy of a managed disk, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub resource_group: String,
    pub time_created: DateTime<Utc>,
    /// Full ARM resource id, when the platform reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Snapshot {
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        time_created: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            time_created,
            id: None,
        }
    }

    /// Addressing key of this snapshot for lock operations.
    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new(SNAPSHOT_RESOURCE_TYPE, &self.name, &self.resource_group)
    }
}

/// Identifies a resource by type, name and owning resource group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: String,
    pub resource_name: String,
    pub resource_group: String,
}

impl ResourceRef {
    pub fn new(
        resource_type: impl Into<String>,
        resource_name: impl Into<String>,
        resource_group: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_name: resource_name.into(),
            resource_group: resource_group.into(),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} (resource group {})",
            self.resource_type, self.resource_name, self.resource_group
        )
    }
}

/// Management lock levels known to the platform.
///
/// Serialized with the platform's wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockLevel {
    /// Authorized users can read and modify, but not delete.
    CanNotDelete,
    /// Authorized users can only read.
    ReadOnly,
}

impl LockLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockLevel::CanNotDelete => "CanNotDelete",
            LockLevel::ReadOnly => "ReadOnly",
        }
    }
}

impl std::fmt::Display for LockLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A management lock attached to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLock {
    pub name: String,
    pub target: ResourceRef,
    pub level: LockLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

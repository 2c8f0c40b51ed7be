//! Azure Resource Manager wire formats and URL construction.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{LockLevel, ResourceLock, ResourceRef, Snapshot};

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

pub const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
pub const SNAPSHOTS_API_VERSION: &str = "2023-10-02";
pub const LOCKS_API_VERSION: &str = "2016-09-01";

const LOCKS_PROVIDER: [&str; 3] = ["providers", "Microsoft.Authorization", "locks"];

/// Paged collection envelope used by every ARM list call.
#[derive(Debug, Deserialize)]
pub struct ArmList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmSubscription {
    pub subscription_id: String,
    #[serde(default)]
    pub state: Option<String>,
}

impl ArmSubscription {
    pub fn is_enabled(&self) -> bool {
        self.state
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("Enabled"))
    }
}

#[derive(Debug, Deserialize)]
pub struct ArmSnapshot {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    pub properties: ArmSnapshotProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmSnapshotProperties {
    pub time_created: DateTime<Utc>,
}

impl ArmSnapshot {
    pub fn into_snapshot(self, resource_group: &str) -> Snapshot {
        Snapshot {
            name: self.name,
            resource_group: resource_group.to_string(),
            time_created: self.properties.time_created,
            id: self.id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ArmLock {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub properties: ArmLockProperties,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArmLockProperties {
    pub level: LockLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Request body for creating a lock.
#[derive(Debug, Serialize)]
pub struct ArmLockRequest<'a> {
    pub properties: ArmLockRequestProperties<'a>,
}

#[derive(Debug, Serialize)]
pub struct ArmLockRequestProperties<'a> {
    pub level: LockLevel,
    pub notes: &'a str,
}

impl ArmLock {
    pub fn into_lock(self, target: &ResourceRef) -> ResourceLock {
        ResourceLock {
            name: self.name,
            target: target.clone(),
            level: self.properties.level,
            notes: self.properties.notes,
        }
    }

    /// Whether this lock is attached directly to the resource identified by
    /// `resource_id` rather than inherited from a parent scope.
    ///
    /// Locks without an id are assumed to be attached directly.
    pub fn is_attached_to(&self, resource_id: &str) -> bool {
        let Some(id) = self.id.as_deref() else {
            return true;
        };
        let prefix = format!("{}/providers/microsoft.authorization/locks/", resource_id)
            .to_ascii_lowercase();
        id.to_ascii_lowercase().starts_with(&prefix)
    }
}

#[derive(Debug, Deserialize)]
struct ArmErrorResponse {
    error: ArmErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ArmErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Describe a failed ARM response, preferring the structured error body.
pub fn describe_failure(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ArmErrorResponse>(body) {
        let detail = match (parsed.error.code, parsed.error.message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (Some(code), None) => Some(code),
            (None, Some(message)) => Some(message),
            (None, None) => None,
        };
        if let Some(detail) = detail {
            return format!("HTTP {status}: {detail}");
        }
    }

    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    }
}

/// ARM resource id path of `target` within a subscription.
pub fn resource_id(subscription_id: &str, target: &ResourceRef) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
        subscription_id, target.resource_group, target.resource_type, target.resource_name
    )
}

/// Build `{endpoint}/{segments...}?api-version={api_version}`.
///
/// Segments are percent-encoded individually.
pub fn build_url(endpoint: &Url, segments: &[&str], api_version: &str) -> Url {
    let mut url = endpoint.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url.query_pairs_mut()
        .clear()
        .append_pair("api-version", api_version);
    url
}

pub fn subscriptions_url(endpoint: &Url) -> Url {
    build_url(endpoint, &["subscriptions"], SUBSCRIPTIONS_API_VERSION)
}

pub fn snapshots_url(endpoint: &Url, subscription_id: &str, resource_group: &str) -> Url {
    build_url(
        endpoint,
        &[
            "subscriptions",
            subscription_id,
            "resourceGroups",
            resource_group,
            "providers",
            "Microsoft.Compute",
            "snapshots",
        ],
        SNAPSHOTS_API_VERSION,
    )
}

/// Lock collection on a resource, or a single lock when `lock_name` is set.
pub fn locks_url(
    endpoint: &Url,
    subscription_id: &str,
    target: &ResourceRef,
    lock_name: Option<&str>,
) -> Url {
    let mut segments = vec![
        "subscriptions",
        subscription_id,
        "resourceGroups",
        target.resource_group.as_str(),
        "providers",
    ];
    segments.extend(target.resource_type.split('/'));
    segments.push(target.resource_name.as_str());
    segments.extend(LOCKS_PROVIDER);
    if let Some(name) = lock_name {
        segments.push(name);
    }
    build_url(endpoint, &segments, LOCKS_API_VERSION)
}

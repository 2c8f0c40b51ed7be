//! Azure Resource Manager implementation of [`CloudResourceApi`].
//!
//! Calls are made with an async `reqwest` client driven to completion on a
//! private current-thread runtime, so every trait method blocks until the
//! platform answers.

use anyhow::Context;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::CloudResourceApi;
use super::arm::{
    self, ArmList, ArmLock, ArmLockRequest, ArmLockRequestProperties, ArmSnapshot,
    ArmSubscription,
};
use super::identity::ManagedIdentity;
use crate::error::CloudError;
use crate::settings::Settings;
use crate::types::{LockLevel, ResourceLock, ResourceRef, Snapshot};

const USER_AGENT: &str = concat!("snaplock/", env!("CARGO_PKG_VERSION"));

/// Token and subscription established by [`AzureClient::authenticate`].
#[derive(Clone)]
struct Session {
    token: String,
    subscription_id: String,
}

/// Blocking ARM client authenticated through a managed identity.
pub struct AzureClient {
    http: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    endpoint: Url,
    identity: ManagedIdentity,
    subscription_id: Option<String>,
    session: Option<Session>,
}

impl std::fmt::Debug for AzureClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("identity", &self.identity)
            .field("subscription_id", &self.subscription_id)
            .field("authenticated", &self.session.is_some())
            .finish()
    }
}

impl AzureClient {
    /// Create a client. When `subscription_id` is `None` the first enabled
    /// subscription visible to the identity is used.
    pub fn new(
        endpoint: Url,
        identity: ManagedIdentity,
        subscription_id: Option<String>,
    ) -> anyhow::Result<Self> {
        if endpoint.cannot_be_a_base() {
            anyhow::bail!("Management endpoint is not a base URL: {}", endpoint);
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;

        Ok(Self {
            http,
            runtime,
            endpoint,
            identity,
            subscription_id,
            session: None,
        })
    }

    /// Create a client from resolved settings and the process environment.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let endpoint = settings.management_endpoint()?;
        let identity = ManagedIdentity::from_env(settings.identity_client_id.clone());
        Self::new(endpoint, identity, settings.subscription_id.clone())
    }

    /// Subscription in use, once authenticated.
    pub fn subscription_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.subscription_id.as_str())
    }

    fn session(&self) -> Result<&Session, String> {
        self.session
            .as_ref()
            .ok_or_else(|| "client is not authenticated".to_string())
    }

    async fn send(
        &self,
        token: &str,
        method: Method,
        url: Url,
        body: Option<&ArmLockRequest<'_>>,
    ) -> anyhow::Result<(StatusCode, String)> {
        tracing::debug!(%method, %url, "ARM request");

        let mut request = self.http.request(method, url.clone()).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;
        Ok((status, text))
    }

    async fn fetch_json<T: DeserializeOwned>(&self, token: &str, url: Url) -> anyhow::Result<T> {
        let (status, body) = self.send(token, Method::GET, url, None).await?;
        if !status.is_success() {
            anyhow::bail!(arm::describe_failure(status, &body));
        }
        serde_json::from_str(&body).context("Failed to parse response JSON")
    }

    /// Collect every page of an ARM list call.
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        token: &str,
        url: Url,
    ) -> anyhow::Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next.take() {
            let page: ArmList<T> = self.fetch_json(token, url).await?;
            items.extend(page.value);
            if let Some(link) = page.next_link.filter(|l| !l.is_empty()) {
                next = Some(
                    Url::parse(&link).with_context(|| format!("Invalid nextLink: {}", link))?,
                );
            }
        }

        Ok(items)
    }

    async fn establish_session(&self) -> anyhow::Result<Session> {
        let token = self
            .identity
            .fetch_token(&self.http, self.endpoint.as_str())
            .await?;

        let subscription_id = match &self.subscription_id {
            Some(id) => id.clone(),
            None => {
                let subscriptions: Vec<ArmSubscription> = self
                    .fetch_all(&token, arm::subscriptions_url(&self.endpoint))
                    .await
                    .context("Failed to discover a subscription")?;
                subscriptions
                    .into_iter()
                    .find(ArmSubscription::is_enabled)
                    .map(|s| s.subscription_id)
                    .ok_or_else(|| {
                        anyhow::anyhow!("The managed identity has no enabled subscription")
                    })?
            }
        };

        Ok(Session {
            token,
            subscription_id,
        })
    }
}

impl CloudResourceApi for AzureClient {
    fn authenticate(&mut self) -> Result<(), CloudError> {
        let session = self
            .runtime
            .block_on(self.establish_session())
            .map_err(|e| CloudError::auth(format!("{e:#}")))?;

        tracing::debug!(subscription = %session.subscription_id, "Authenticated");
        self.session = Some(session);
        Ok(())
    }

    fn list_snapshots(&self, resource_group: &str) -> Result<Vec<Snapshot>, CloudError> {
        let session = self
            .session()
            .map_err(|e| CloudError::list(resource_group, e))?;
        let url = arm::snapshots_url(&self.endpoint, &session.subscription_id, resource_group);

        let snapshots: Vec<ArmSnapshot> = self
            .runtime
            .block_on(self.fetch_all(&session.token, url))
            .map_err(|e| CloudError::list(resource_group, format!("{e:#}")))?;

        Ok(snapshots
            .into_iter()
            .map(|s| s.into_snapshot(resource_group))
            .collect())
    }

    fn get_lock(&self, target: &ResourceRef) -> Result<Option<ResourceLock>, CloudError> {
        let session = self
            .session()
            .map_err(|e| CloudError::lock_lookup(target, e))?;
        let url = arm::locks_url(&self.endpoint, &session.subscription_id, target, None);

        let locks: Vec<ArmLock> = self
            .runtime
            .block_on(self.fetch_all(&session.token, url))
            .map_err(|e| CloudError::lock_lookup(target, format!("{e:#}")))?;

        let resource_id = arm::resource_id(&session.subscription_id, target);
        Ok(locks
            .into_iter()
            .find(|lock| lock.is_attached_to(&resource_id))
            .map(|lock| lock.into_lock(target)))
    }

    fn create_lock(
        &mut self,
        target: &ResourceRef,
        lock_name: &str,
        level: LockLevel,
        notes: &str,
    ) -> Result<ResourceLock, CloudError> {
        let session = self
            .session()
            .map_err(|e| CloudError::lock_create(target, lock_name, e))?;
        let url = arm::locks_url(
            &self.endpoint,
            &session.subscription_id,
            target,
            Some(lock_name),
        );
        let body = ArmLockRequest {
            properties: ArmLockRequestProperties { level, notes },
        };

        let created = self
            .runtime
            .block_on(async {
                let (status, text) = self
                    .send(&session.token, Method::PUT, url, Some(&body))
                    .await?;
                if !status.is_success() {
                    anyhow::bail!(arm::describe_failure(status, &text));
                }
                serde_json::from_str::<ArmLock>(&text).context("Failed to parse created lock")
            })
            .map_err(|e| CloudError::lock_create(target, lock_name, format!("{e:#}")))?;

        Ok(created.into_lock(target))
    }

    fn delete_lock(&mut self, target: &ResourceRef, lock_name: &str) -> Result<(), CloudError> {
        let session = self
            .session()
            .map_err(|e| CloudError::lock_delete(target, lock_name, e))?;
        let url = arm::locks_url(
            &self.endpoint,
            &session.subscription_id,
            target,
            Some(lock_name),
        );

        self.runtime
            .block_on(async {
                let (status, text) = self.send(&session.token, Method::DELETE, url, None).await?;
                if !status.is_success() {
                    anyhow::bail!(arm::describe_failure(status, &text));
                }
                Ok::<(), anyhow::Error>(())
            })
            .map_err(|e| CloudError::lock_delete(target, lock_name, format!("{e:#}")))
    }
}

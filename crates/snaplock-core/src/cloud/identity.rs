//! Managed identity token acquisition.
//!
//! Hosts that run scheduled jobs expose the identity in one of two ways:
//! - App Service, Functions and Automation set `IDENTITY_ENDPOINT` and
//!   `IDENTITY_HEADER`
//! - virtual machines and everything else answer on the instance metadata
//!   service (IMDS)

use anyhow::Context;
use serde::Deserialize;
use url::Url;

const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Where the identity token is requested from.
#[derive(Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// Local identity endpoint advertised by the hosting service.
    HostEndpoint { endpoint: String, secret: String },
    /// Instance metadata service.
    Imds,
}

impl std::fmt::Debug for IdentitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentitySource::HostEndpoint { endpoint, .. } => f
                .debug_struct("HostEndpoint")
                .field("endpoint", endpoint)
                .field("secret", &"<redacted>")
                .finish(),
            IdentitySource::Imds => f.write_str("Imds"),
        }
    }
}

/// Managed identity credential, optionally user-assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedIdentity {
    source: IdentitySource,
    client_id: Option<String>,
    imds_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl ManagedIdentity {
    pub fn new(source: IdentitySource, client_id: Option<String>) -> Self {
        Self {
            source,
            client_id,
            imds_endpoint: IMDS_TOKEN_ENDPOINT.to_string(),
        }
    }

    /// Override the IMDS token endpoint.
    pub fn with_imds_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.imds_endpoint = endpoint.into();
        self
    }

    /// Detect the identity source from the process environment.
    pub fn from_env(client_id: Option<String>) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), client_id)
    }

    /// Detect the identity source through an arbitrary variable lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        client_id: Option<String>,
    ) -> Self {
        let source = match (lookup("IDENTITY_ENDPOINT"), lookup("IDENTITY_HEADER")) {
            (Some(endpoint), Some(secret)) if !endpoint.is_empty() && !secret.is_empty() => {
                IdentitySource::HostEndpoint { endpoint, secret }
            }
            _ => IdentitySource::Imds,
        };
        Self::new(source, client_id)
    }

    pub fn source(&self) -> &IdentitySource {
        &self.source
    }

    /// Token request URL for `resource`.
    pub fn token_url(&self, resource: &str) -> anyhow::Result<Url> {
        let (base, api_version) = match &self.source {
            IdentitySource::HostEndpoint { endpoint, .. } => {
                (endpoint.as_str(), APP_SERVICE_API_VERSION)
            }
            IdentitySource::Imds => (self.imds_endpoint.as_str(), IMDS_API_VERSION),
        };

        let mut url = Url::parse(base)
            .with_context(|| format!("Invalid managed identity endpoint: {}", base))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("api-version", api_version)
                .append_pair("resource", resource);
            if let Some(client_id) = &self.client_id {
                query.append_pair("client_id", client_id);
            }
        }
        Ok(url)
    }

    /// Fetch an access token for `resource`.
    pub async fn fetch_token(
        &self,
        http: &reqwest::Client,
        resource: &str,
    ) -> anyhow::Result<String> {
        let url = self.token_url(resource)?;
        tracing::debug!(source = self.source_kind(), "Requesting managed identity token");

        let mut request = http.get(url);
        request = match &self.source {
            IdentitySource::HostEndpoint { secret, .. } => {
                request.header("X-IDENTITY-HEADER", secret)
            }
            IdentitySource::Imds => request.header("Metadata", "true"),
        };

        let response = request
            .send()
            .await
            .context("Failed to reach the managed identity endpoint")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read managed identity response body")?;
        if !status.is_success() {
            anyhow::bail!(
                "Managed identity endpoint rejected the token request: {}",
                super::arm::describe_failure(status, &body)
            );
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .context("Failed to parse managed identity token response")?;
        if token.access_token.is_empty() {
            anyhow::bail!("Managed identity endpoint returned an empty access token");
        }
        Ok(token.access_token)
    }

    fn source_kind(&self) -> &'static str {
        match self.source {
            IdentitySource::HostEndpoint { .. } => "host-endpoint",
            IdentitySource::Imds => "imds",
        }
    }
}

//! Run settings: defaults, an optional `snaplock.toml`, then environment.
//!
//! Settings are only ever read; nothing is written back.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cloud::arm::DEFAULT_MANAGEMENT_ENDPOINT;

pub const SETTINGS_FILE_NAME: &str = "snaplock.toml";

/// Resolved settings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Subscription holding the resource group. Discovered when unset.
    pub subscription_id: Option<String>,
    /// Resource Manager endpoint (sovereign clouds use their own).
    pub management_endpoint: Option<String>,
    /// Client id of a user-assigned managed identity.
    pub identity_client_id: Option<String>,
    /// Lock name used when creating locks.
    pub lock_name: Option<String>,
    /// Note attached to created locks.
    pub lock_note: Option<String>,
}

impl Settings {
    /// Default settings file location: `<config_dir>/snaplock/snaplock.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("snaplock").join(SETTINGS_FILE_NAME))
    }

    /// Load settings from `path`, or from the default location when it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content).context("Invalid TOML")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_lookup(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary variable lookup. Empty values are ignored.
    pub fn apply_lookup(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AZURE_SUBSCRIPTION_ID") {
            self.subscription_id = Some(v);
        }
        if let Some(v) = get("AZURE_CLIENT_ID") {
            self.identity_client_id = Some(v);
        }
        if let Some(v) = get("SNAPLOCK_MANAGEMENT_ENDPOINT") {
            self.management_endpoint = Some(v);
        }
    }

    /// Parsed management endpoint, defaulting to the public cloud.
    pub fn management_endpoint(&self) -> Result<Url> {
        let raw = self
            .management_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_MANAGEMENT_ENDPOINT);
        let url = Url::parse(raw).with_context(|| format!("Invalid management endpoint: {}", raw))?;
        if !matches!(url.scheme(), "https" | "http") {
            anyhow::bail!("Management endpoint must be an http(s) URL: {}", raw);
        }
        Ok(url)
    }

    fn validate(&self) -> Result<()> {
        if self.management_endpoint.is_some() {
            self.management_endpoint()?;
        }
        if let Some(name) = &self.lock_name
            && name.trim().is_empty()
        {
            anyhow::bail!("lock_name must not be empty");
        }
        Ok(())
    }
}

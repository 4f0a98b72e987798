//! Environment catalog: per-environment endpoint and initiator credentials.
//!
//! Loaded from a JSON file shaped like:
//!
//! ```json
//! {
//!   "UAT": {
//!     "connection": { "address": "10.0.0.5", "port": 9876 },
//!     "initiators": [
//!       { "senderCompId": "INIT1", "keystorePassword": "secret", "enabled": true }
//!     ]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Read-only lookup over environment settings, consumed by session startup
/// and credential loading.
pub trait ConfigLookup: Send + Sync {
    fn address(&self, env: &str) -> Option<String>;
    fn port(&self, env: &str) -> Option<u16>;
    fn password(&self, env: &str, sender: &str) -> Option<String>;
    /// Keystore password for `sender` from the first environment (in name
    /// order) that lists it.
    fn find_password(&self, sender: &str) -> Option<String>;
    /// True when `env` exists and lists `sender` as an enabled initiator.
    fn is_valid(&self, env: &str, target: &str, sender: &str) -> bool;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub connection: Option<ConnectionConfig>,
    #[serde(default)]
    pub initiators: Vec<InitiatorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatorConfig {
    pub sender_comp_id: String,
    #[serde(default)]
    pub keystore_password: Option<String>,
    /// Absent means enabled.
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl InitiatorConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// In-memory environment catalog keyed by environment name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentCatalog {
    environments: BTreeMap<String, EnvironmentConfig>,
}

impl EnvironmentCatalog {
    /// Load the catalog from `path`.  A missing file yields an empty
    /// catalog; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "environment catalog not found, starting with no environments"
            );
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let catalog: Self = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            environments = catalog.environments.len(),
            "environment catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_environments(environments: BTreeMap<String, EnvironmentConfig>) -> Self {
        Self { environments }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    fn initiator(&self, env: &str, sender: &str) -> Option<&InitiatorConfig> {
        self.environments
            .get(env)?
            .initiators
            .iter()
            .find(|i| i.sender_comp_id == sender)
    }
}

impl ConfigLookup for EnvironmentCatalog {
    fn address(&self, env: &str) -> Option<String> {
        self.environments
            .get(env)?
            .connection
            .as_ref()?
            .address
            .clone()
    }

    fn port(&self, env: &str) -> Option<u16> {
        self.environments.get(env)?.connection.as_ref()?.port
    }

    fn password(&self, env: &str, sender: &str) -> Option<String> {
        self.initiator(env, sender)?.keystore_password.clone()
    }

    fn find_password(&self, sender: &str) -> Option<String> {
        self.environments.values().find_map(|env| {
            env.initiators
                .iter()
                .find(|i| i.sender_comp_id == sender)
                .and_then(|i| i.keystore_password.clone())
        })
    }

    fn is_valid(&self, env: &str, _target: &str, sender: &str) -> bool {
        self.initiator(env, sender)
            .map(InitiatorConfig::is_enabled)
            .unwrap_or(false)
    }
}

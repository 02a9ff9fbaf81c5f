//! Permission resolution configuration

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for the Permission Resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclConfig {
    /// How long a resolved permission set stays valid
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Catalogue of resource names; grants on other names are ignored
    #[serde(default)]
    pub known_resources: Option<Vec<String>>,

    /// Logins denied regardless of their grants
    #[serde(default)]
    pub suspended_logins: Vec<String>,
}

fn default_cache_ttl_secs() -> u64 {
    300 // 5 minutes
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            known_resources: None,
            suspended_logins: Vec::new(),
        }
    }
}

impl AclConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Get cache TTL as Duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Known resources as a lookup set
    pub fn resource_catalogue(&self) -> Option<HashSet<String>> {
        self.known_resources
            .as_ref()
            .map(|names| names.iter().cloned().collect())
    }
}

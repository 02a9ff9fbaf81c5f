//! Identity resolution configuration

use serde::{Deserialize, Serialize};

/// Configuration for the Identity Resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Environment variable that overrides every other source
    #[serde(default = "default_env_override_var")]
    pub env_override_var: String,

    /// Trusted reverse-proxy headers, highest precedence first
    #[serde(default = "default_trusted_headers")]
    pub trusted_headers: Vec<String>,
}

fn default_env_override_var() -> String {
    "FOUREYES_USER".to_string()
}

fn default_trusted_headers() -> Vec<String> {
    vec![
        "X-Remote-User".to_string(),
        "X-Forwarded-User".to_string(),
        "X-Auth-Request-User".to_string(),
        "Remote-User".to_string(),
    ]
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            env_override_var: default_env_override_var(),
            trusted_headers: default_trusted_headers(),
        }
    }
}

impl IdentityConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

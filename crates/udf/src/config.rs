//! Typed value store configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_definition_resource() -> String {
    "udf_definition".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// UDF engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdfConfig {
    /// Resource guarding definition changes (`create` to define, `delete` to deactivate)
    #[serde(default = "default_definition_resource")]
    pub definition_resource: String,

    /// Deadline applied to each operation
    #[serde(default = "default_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for UdfConfig {
    fn default() -> Self {
        Self {
            definition_resource: default_definition_resource(),
            operation_timeout_ms: default_timeout_ms(),
        }
    }
}

impl UdfConfig {
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

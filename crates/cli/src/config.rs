//! Aggregate configuration for the CLI

use std::path::{Path, PathBuf};

use foureyes_acl::AclConfig;
use foureyes_identity::IdentityConfig;
use foureyes_udf::UdfConfig;
use foureyes_workflow::WorkflowConfig;
use serde::{Deserialize, Serialize};

/// Name of the optional config file inside the data directory
pub const CONFIG_FILE: &str = "foureyes.json";

/// Every component's configuration plus file locations
///
/// Relative paths are resolved against the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub acl: AclConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub udf: UdfConfig,

    /// Group memberships and grants
    #[serde(default = "default_permissions_file")]
    pub permissions_file: PathBuf,

    /// SQLite database holding entities and UDF values
    #[serde(default = "default_database_file")]
    pub database_file: PathBuf,

    /// Hash-chained JSONL audit ledger
    #[serde(default = "default_audit_file")]
    pub audit_file: PathBuf,
}

fn default_permissions_file() -> PathBuf {
    PathBuf::from("permissions.json")
}

fn default_database_file() -> PathBuf {
    PathBuf::from("foureyes.db")
}

fn default_audit_file() -> PathBuf {
    PathBuf::from("audit.jsonl")
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            acl: AclConfig::default(),
            workflow: WorkflowConfig::default(),
            udf: UdfConfig::default(),
            permissions_file: default_permissions_file(),
            database_file: default_database_file(),
            audit_file: default_audit_file(),
        }
    }
}

impl GovernanceConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// `foureyes.json` from the data directory, or defaults when absent
    pub fn load(data_path: &Path) -> Result<Self, std::io::Error> {
        let path = data_path.join(CONFIG_FILE);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn permissions_path(&self, data_path: &Path) -> PathBuf {
        data_path.join(&self.permissions_file)
    }

    pub fn database_path(&self, data_path: &Path) -> PathBuf {
        data_path.join(&self.database_file)
    }

    pub fn audit_path(&self, data_path: &Path) -> PathBuf {
        data_path.join(&self.audit_file)
    }
}

//! Application context - wires everything together

use std::path::{Path, PathBuf};
use std::sync::Arc;

use foureyes_acl::{PermissionResolver, StaticPermissionStore};
use foureyes_audit::AuditLedger;
use foureyes_core::{Actor, GovernanceResult};
use foureyes_identity::{IdentityResolver, RequestContext};
use foureyes_udf::{SqliteUdfStore, UdfEngine};
use foureyes_workflow::{SqliteEntityStore, WorkflowEngine};

use crate::config::GovernanceConfig;

/// Application context - wires together all components
pub struct AppContext {
    pub identity: IdentityResolver,
    pub permissions: Arc<PermissionResolver>,
    pub workflow: WorkflowEngine,
    pub udf: UdfEngine,
    pub ledger: Arc<AuditLedger>,
    config: GovernanceConfig,
    data_path: PathBuf,
}

impl AppContext {
    /// Create a new application context
    ///
    /// Without a permissions file every request is denied.
    pub fn new(data_path: impl AsRef<Path>, config: GovernanceConfig) -> Result<Self, anyhow::Error> {
        let data_path = data_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_path)?;

        let permissions_path = config.permissions_path(&data_path);
        let permission_store = if permissions_path.exists() {
            StaticPermissionStore::from_file(&permissions_path)?
        } else {
            tracing::warn!(path = %permissions_path.display(), "No permissions file; all actions will be denied");
            StaticPermissionStore::new()
        };
        let permissions = Arc::new(PermissionResolver::new(Arc::new(permission_store), &config.acl));

        let ledger = Arc::new(AuditLedger::open(config.audit_path(&data_path))?);

        let database_path = config.database_path(&data_path);
        let workflow = WorkflowEngine::new(
            Arc::new(SqliteEntityStore::new(&database_path)?),
            permissions.clone(),
            ledger.clone(),
            config.workflow.clone(),
        );
        let udf = UdfEngine::new(
            Arc::new(SqliteUdfStore::new(&database_path)?),
            permissions.clone(),
            ledger.clone(),
            config.udf.clone(),
        );

        Ok(Self {
            identity: IdentityResolver::new(config.identity.clone()),
            permissions,
            workflow,
            udf,
            ledger,
            config,
            data_path,
        })
    }

    /// Load `foureyes.json` from the data directory and build the context
    pub fn open(data_path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let config = GovernanceConfig::load(data_path.as_ref())?;
        Self::new(data_path, config)
    }

    /// Resolve the acting identity
    ///
    /// The environment override wins over `--as`; the OS user is the
    /// session fallback.
    pub fn actor(&self, explicit: Option<&str>) -> GovernanceResult<Actor> {
        let mut request = RequestContext::from_process_env([self.config.identity.env_override_var.as_str()]);
        if let Some(login) = explicit {
            request = request.with_explicit_identity(login);
        }
        if let Ok(user) = std::env::var("USER") {
            request = request.with_session_identity(user);
        }
        self.identity.resolve(&request)
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

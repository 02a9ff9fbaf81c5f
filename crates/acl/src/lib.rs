//! FourEyes Permission Resolver
//!
//! Computes what a normalized actor may do, from group-based grants held by
//! an external store:
//!
//! ```text
//! Actor ──► PermissionCache ──(miss/expired)──► PermissionStore
//!               │                                 findGroupForLogin
//!               │                                 findGrantsForGroup
//!               ▼
//!      EffectivePermissions (union of grants)
//!               │
//!               ▼
//!      AuthorizationPipeline (ordered stages, first Deny wins)
//!               │
//!               ▼
//!        Decision::Allow / Decision::Deny
//! ```
//!
//! Decisions are deny-by-default: a missing grant is a denial, not an error.
//! An unreachable store is an error (`ExternalStoreUnavailable`), never a
//! denial.

pub mod cache;
pub mod config;
pub mod grant;
pub mod pipeline;
pub mod resolver;
pub mod store;

pub use cache::PermissionCache;
pub use config::AclConfig;
pub use grant::{EffectivePermissions, GroupId, PermissionGrant};
pub use pipeline::{
    AuthorizationPipeline, AuthorizationRequest, AuthorizationStage, Decision, GrantStage,
    StageVerdict, SuspendedActorStage,
};
pub use resolver::{PermissionChange, PermissionResolver};
pub use store::{PermissionFile, PermissionStore, PermissionStoreError, StaticPermissionStore};

//! # FourEyes Workflow Engine
//!
//! Generic maker-checker state machine for any governed record.
//!
//! ```text
//!            submit              approve
//!   DRAFT ───────────► PENDING ───────────► APPROVED / ACTIVE
//!     ▲                APPROVAL                  │
//!     │ edit              │ reject               │ close
//!     │                   ▼                      ▼
//!     └─────────────── REJECTED               CLOSED
//!          (edit, resubmit)                      │ reactivate
//!                                                └────────► ACTIVE
//! ```
//!
//! ## Guarantees
//! - The checker is never the maker (configurable: creator, or creator and submitter)
//! - Every attempt produces exactly one audit record
//! - Only successful transitions produce a history record
//! - Concurrent transitions are serialized by compare-and-swap on status and version

mod config;
mod engine;
mod entity;
mod resource;
mod sqlite;
mod status;
mod store;

pub use config::{SelfApprovalPolicy, WorkflowConfig};
pub use engine::{ScopedWorkflow, WorkflowEngine, WorkflowStats};
pub use entity::{GovernedEntity, WorkflowHistoryRecord};
pub use resource::ResourceMap;
pub use sqlite::SqliteEntityStore;
pub use status::{Transition, WorkflowStatus};
pub use store::{EntityStore, MemoryEntityStore, StoreError, SwapOutcome};

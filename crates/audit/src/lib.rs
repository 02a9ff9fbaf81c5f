//! FourEyes Audit Recorder
//!
//! Durable sink for every state-changing action attempt, successful or not.
//!
//! ```text
//! WorkflowEngine ─┐
//!                 ├──► AuditEntry ──► AuditLedger ──► AuditRecord (JSONL)
//! UdfEngine ──────┘                     │  sequence + prev_hash + hash
//!                                       ▼
//!                                 verify_chain()
//! ```
//!
//! Records are append-only and immutable. Each record carries the SHA-256
//! hash of its predecessor so tampering with the file is detectable.

pub mod chain;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod record;

pub use chain::{verify_chain, ChainError};
pub use error::{AuditError, AuditResult};
pub use filter::AuditFilter;
pub use ledger::AuditLedger;
pub use record::{AuditEntry, AuditOutcome, AuditRecord};

use async_trait::async_trait;

/// Durable sink for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Seal and persist an entry, returning the stored record
    async fn record(&self, entry: AuditEntry) -> AuditResult<AuditRecord>;
}

/// Read API over stored audit records, for reporting
#[async_trait]
pub trait AuditReader: Send + Sync {
    /// Records matching the filter, in append order
    async fn query(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditRecord>>;
}

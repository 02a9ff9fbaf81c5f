//! Hash chain for audit ledger integrity

use crate::record::{AuditEntry, AuditRecord};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// prev_hash of the first record
pub const GENESIS: &str = "GENESIS";

/// SHA-256 over the record content, excluding its own hash
pub fn calculate_record_hash(id: &str, sequence: u64, prev_hash: &str, entry: &AuditEntry) -> String {
    let mut hasher = Sha256::new();

    hasher.update(id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(entry.timestamp.to_rfc3339().as_bytes());
    hasher.update(entry.actor.as_bytes());
    hasher.update(entry.action.as_bytes());
    hasher.update(entry.entity_type.as_bytes());
    hasher.update(entry.entity_id.as_bytes());
    hasher.update(entry.outcome.as_str().as_bytes());

    for snapshot in [&entry.before, &entry.after] {
        match snapshot {
            Some(value) => hasher.update(value.to_string().as_bytes()),
            None => hasher.update(b"-"),
        }
    }
    for detail in [&entry.error_code, &entry.error_detail] {
        match detail {
            Some(text) => hasher.update(text.as_bytes()),
            None => hasher.update(b"-"),
        }
    }

    hex::encode(hasher.finalize())
}

/// Verify hash chain integrity
pub fn verify_chain(records: &[AuditRecord]) -> Result<(), ChainError> {
    let mut prev_hash = GENESIS.to_string();

    for (i, record) in records.iter().enumerate() {
        if record.prev_hash != prev_hash {
            return Err(ChainError::BrokenLink {
                sequence: record.sequence,
                expected: prev_hash,
                actual: record.prev_hash.clone(),
            });
        }

        let calculated =
            calculate_record_hash(&record.id, record.sequence, &record.prev_hash, &record.entry);
        if record.hash != calculated {
            return Err(ChainError::InvalidHash {
                sequence: record.sequence,
                expected: calculated,
                actual: record.hash.clone(),
            });
        }

        let expected_sequence = i as u64 + 1;
        if record.sequence != expected_sequence {
            return Err(ChainError::InvalidSequence {
                expected: expected_sequence,
                actual: record.sequence,
            });
        }

        prev_hash = record.hash.clone();
    }

    Ok(())
}

/// Hash chain verification errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Broken link at sequence {sequence}: expected prev_hash {expected}, got {actual}")]
    BrokenLink {
        sequence: u64,
        expected: String,
        actual: String,
    },

    #[error("Invalid hash at sequence {sequence}: expected {expected}, got {actual}")]
    InvalidHash {
        sequence: u64,
        expected: String,
        actual: String,
    },

    #[error("Invalid sequence: expected {expected}, got {actual}")]
    InvalidSequence { expected: u64, actual: u64 },
}

//! Audit Ledger - append-only JSONL storage
//!
//! Each line is a JSON-serialized [`AuditRecord`]. Records are sealed on
//! append: the ledger assigns the sequence number and links the record to
//! its predecessor's hash.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, error};
use uuid::Uuid;

use crate::chain::{calculate_record_hash, verify_chain, ChainError, GENESIS};
use crate::error::{AuditError, AuditResult};
use crate::filter::AuditFilter;
use crate::record::{AuditEntry, AuditRecord};
use crate::{AuditReader, AuditSink};

struct LedgerState {
    file: Option<File>,
    /// Only populated for in-memory ledgers
    records: Vec<AuditRecord>,
    last_hash: String,
    last_sequence: u64,
}

/// Append-only, hash-chained audit ledger
///
/// File-backed ledgers survive restarts and resume the chain from the last
/// record on disk. In-memory ledgers keep their records for the lifetime of
/// the value.
pub struct AuditLedger {
    path: Option<PathBuf>,
    state: Mutex<LedgerState>,
    available: AtomicBool,
}

impl AuditLedger {
    /// Open (or create) a ledger at the given path
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let existing = read_file(&path)?;
        let (last_hash, last_sequence) = existing
            .last()
            .map(|r| (r.hash.clone(), r.sequence))
            .unwrap_or_else(|| (GENESIS.to_string(), 0));

        debug!(path = %path.display(), records = existing.len(), "Opened audit ledger");

        Ok(Self {
            path: Some(path),
            state: Mutex::new(LedgerState {
                file: Some(file),
                records: Vec::new(),
                last_hash,
                last_sequence,
            }),
            available: AtomicBool::new(true),
        })
    }

    /// Create an in-memory ledger
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(LedgerState {
                file: None,
                records: Vec::new(),
                last_hash: GENESIS.to_string(),
                last_sequence: 0,
            }),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: appends fail with `Unavailable` while switched off
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Seal an entry and append it
    pub fn append(&self, entry: AuditEntry) -> AuditResult<AuditRecord> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("audit ledger is offline".to_string()));
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let id = Uuid::new_v4().to_string();
        let sequence = state.last_sequence + 1;
        let prev_hash = state.last_hash.clone();
        let hash = calculate_record_hash(&id, sequence, &prev_hash, &entry);
        let record = AuditRecord {
            id,
            sequence,
            entry,
            prev_hash,
            hash,
        };

        if let Some(ref mut file) = state.file {
            let mut line = serde_json::to_string(&record)?;
            line.push('\n');
            append_line(file, line.as_bytes())?;
        } else {
            state.records.push(record.clone());
        }

        state.last_sequence = sequence;
        state.last_hash = record.hash.clone();

        Ok(record)
    }

    /// Read all records in append order
    pub fn read_all(&self) -> AuditResult<Vec<AuditRecord>> {
        match self.path {
            Some(ref path) => {
                // Hold the lock so a concurrent append is never half-read
                let _state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                read_file(path)
            }
            None => {
                let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                Ok(state.records.clone())
            }
        }
    }

    /// Records matching a filter
    pub fn read_filtered(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect())
    }

    /// Verify the whole chain
    pub fn verify(&self) -> AuditResult<Result<usize, ChainError>> {
        let records = self.read_all()?;
        Ok(verify_chain(&records).map(|_| records.len()))
    }

    /// Number of records appended so far
    pub fn len(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_sequence
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.is_none()
    }
}

/// Ledger output that can be cut back after a failed write
trait LineSink: Write {
    fn end(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl LineSink for File {
    fn end(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append a whole line or nothing; a torn write is truncated away
fn append_line<S: LineSink>(sink: &mut S, line: &[u8]) -> io::Result<()> {
    let prior = sink.end()?;
    let written = sink.write_all(line).and_then(|_| sink.flush());
    if let Err(err) = written {
        if let Err(cut) = sink.truncate_to(prior) {
            error!(error = %cut, "Failed to cut back partial audit line");
        }
        return Err(err);
    }
    Ok(())
}

fn read_file(path: &Path) -> AuditResult<Vec<AuditRecord>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }

    Ok(records)
}

#[async_trait]
impl AuditSink for AuditLedger {
    async fn record(&self, entry: AuditEntry) -> AuditResult<AuditRecord> {
        self.append(entry).map_err(|e| {
            error!(error = %e, "Failed to append audit record");
            e
        })
    }
}

#[async_trait]
impl AuditReader for AuditLedger {
    async fn query(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditRecord>> {
        self.read_filtered(filter)
    }
}

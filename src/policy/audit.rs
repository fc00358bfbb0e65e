//! Append-only audit log for policy decisions
//!
//! Every policy evaluation writes exactly one record, denials included —
//! denials are the security-relevant event. Records are JSON lines; the
//! engine never mutates or deletes past entries.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write as _};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::Verdict;
use crate::turn::{ActionKind, Intent};
use crate::{Error, Result};

/// One audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record ID
    pub id: Uuid,
    /// Wall-clock timestamp of the decision
    pub at: DateTime<Utc>,
    /// Turn sequence number within the session
    pub turn: u64,
    /// Action category of the evaluated intent
    pub kind: ActionKind,
    /// One-line intent summary (structured parameters, no transcript text)
    pub intent: String,
    /// Decision verdict
    pub verdict: Verdict,
    /// Human-readable reason
    pub reason: String,
    /// Rule that matched, or `no-match-default-deny`
    pub rule_id: String,
}

impl AuditRecord {
    /// Build a record for a decision on `intent` during `turn`
    #[must_use]
    pub fn new(
        turn: u64,
        intent: &Intent,
        verdict: Verdict,
        reason: impl Into<String>,
        rule_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            turn,
            kind: intent.kind,
            intent: intent.summary(),
            verdict,
            reason: reason.into(),
            rule_id: rule_id.into(),
        }
    }
}

/// Sink for audit records
///
/// Appends must be serialized and ordered; implementations are injected
/// into the policy engine rather than reached through a global.
pub trait AuditSink: Send + Sync {
    /// Append one record
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be durably appended. The engine
    /// fails closed on audit errors.
    fn append(&self, record: &AuditRecord) -> Result<()>;
}

/// Shared handle to an audit sink
pub type SharedAuditSink = Arc<dyn AuditSink>;

/// File-backed audit log, one JSON object per line
pub struct FileAuditLog {
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditLog {
    /// Open (or create) the audit log at `path` in append mode
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened for appending
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        tracing::debug!(path = %path.display(), "audit log opened");

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl AuditSink for FileAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::Audit("audit writer poisoned".to_string()))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// In-memory audit sink for tests
#[derive(Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    /// Empty in-memory log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records appended so far
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| Error::Audit("audit store poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

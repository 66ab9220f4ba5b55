//! Audit Log - append-only JSONL trail of every intent, decision and outcome
//!
//! One JSON object per line. Each write opens the file in append mode, writes
//! the record and syncs it before returning. Records are never edited or
//! removed. Single writer: the daemon's cycle task is the only writer.

use crate::error::AuditError;
use crate::types::{Decision, Diagnosis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Audit file name inside the data directory
pub const AUDIT_FILE: &str = "audit.jsonl";

/// System-wide fallback directory when no per-user data directory exists
pub const SYSTEM_AUDIT_DIR: &str = "/var/lib/linkmedic";

/// Default audit path: `$XDG_DATA_HOME/linkmedic/audit.jsonl`
pub fn default_audit_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("linkmedic"))
        .unwrap_or_else(|| PathBuf::from(SYSTEM_AUDIT_DIR))
        .join(AUDIT_FILE)
}

/// Kind-specific audit payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// An action is about to run. Written before any privileged command.
    Intent {
        action: String,
        interface: String,
        commands: Vec<Vec<String>>,
        reason: String,
    },

    /// The gate evaluated a diagnosis
    Decision {
        diagnosis: Diagnosis,
        decision: Decision,
        reasoning: String,
    },

    /// An `execute` call concluded (success, failure or refusal)
    ActionOutcome {
        action: String,
        interface: String,
        success: bool,
        exit_code: i32,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        steps_completed: usize,
        steps_total: usize,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::Intent { .. } => "intent",
            AuditEvent::Decision { .. } => "decision",
            AuditEvent::ActionOutcome { .. } => "action_outcome",
        }
    }
}

/// One line of the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    pub fn now(event: AuditEvent) -> Self {
        Self {
            ts: Utc::now(),
            event,
        }
    }
}

/// Append-only audit sink
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Create a log at `path`; the file and its parents are created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event, stamped with the current time
    pub async fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.write(&AuditRecord::now(event)).await
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(record)? + "\n";

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent).await.map_err(|e| self.io_err(e))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_err(e))?;
        file.flush().await.map_err(|e| self.io_err(e))?;
        file.sync_all().await.map_err(|e| self.io_err(e))?;

        debug!("audit: {} record appended", record.event.kind());
        Ok(())
    }

    /// Read every record. Lines that fail to parse are skipped.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// The last `n` records, oldest first
    pub fn tail(&self, n: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let mut records = self.read_all()?;
        let skip = records.len().saturating_sub(n);
        Ok(records.split_off(skip))
    }

    fn io_err(&self, source: std::io::Error) -> AuditError {
        AuditError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

//! Append-only resolution audit log.
//!
//! Every inference attempt — success or failure — becomes one immutable
//! JSON Lines record.  This is the resolver's only non-idempotent write, and
//! it is a side channel: the resolver returns [`ResolutionAttempt`] values
//! and the caller appends them here, so resolution itself stays pure and
//! testable.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::inference::InferenceReply;

/// One inference attempt, as produced by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionAttempt {
    pub merchant: String,
    pub prompt: String,
    /// Verbatim endpoint body, when one was received.
    pub raw_response: Option<String>,
    pub parsed: Option<InferenceReply>,
    pub latency_ms: u64,
    /// `Some(message)` marks a failed attempt.
    pub error: Option<String>,
}

impl ResolutionAttempt {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The envelope actually written to disk: attempt plus identity and order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    /// Dense, zero-based position in the log.
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    #[serde(flatten)]
    pub attempt: ResolutionAttempt,
}

/// Append-only audit writer.  One JSON object per line; lines are never
/// reordered or rewritten.
pub struct ResolutionAuditWriter {
    path: PathBuf,
    seq: u64,
}

impl ResolutionAuditWriter {
    /// Create the writer, ensuring parent directories exist.  When the log
    /// already exists the sequence resumes after its last line.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // A bare relative filename has `Some("")` as its parent.
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {parent:?}"))?;
        }
        let seq = match fs::read_to_string(&path) {
            Ok(existing) => existing.lines().filter(|l| !l.trim().is_empty()).count() as u64,
            Err(_) => 0,
        };
        Ok(Self { path, seq })
    }

    /// Number of events appended so far (the next event's seq).
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one attempt.  Returns the written envelope.
    pub fn append(&mut self, attempt: ResolutionAttempt) -> Result<AuditEvent> {
        let event = AuditEvent {
            event_id: Uuid::new_v4(),
            seq: self.seq,
            ts_utc: Utc::now(),
            attempt,
        };
        let line = serde_json::to_string(&event).context("audit event serialize failed")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open audit log {:?}", self.path))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .with_context(|| format!("append audit log {:?}", self.path))?;

        self.seq += 1;
        Ok(event)
    }
}

/// Result of verifying an audit log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// Every line parsed and `seq` ran dense from 0.
    Valid { lines: u64 },
    /// The log is damaged at the given 1-based line.
    Broken { line: u64, reason: String },
}

/// Re-read an audit log and check that every line parses and the sequence
/// is dense.  A missing file verifies as zero lines.
pub fn verify_audit_log(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let raw = match fs::read_to_string(path.as_ref()) {
        Ok(r) => r,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(VerifyResult::Valid { lines: 0 })
        }
        Err(e) => return Err(e).context("read audit log"),
    };

    let mut expected: u64 = 0;
    for (i, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: AuditEvent = match serde_json::from_str(line) {
            Ok(ev) => ev,
            Err(e) => {
                return Ok(VerifyResult::Broken {
                    line: i as u64 + 1,
                    reason: format!("unparsable event: {e}"),
                })
            }
        };
        if event.seq != expected {
            return Ok(VerifyResult::Broken {
                line: i as u64 + 1,
                reason: format!("seq {} where {} was expected", event.seq, expected),
            });
        }
        expected += 1;
    }
    Ok(VerifyResult::Valid { lines: expected })
}

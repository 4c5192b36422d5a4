//! Audit stores: append-only JSONL file and an in-memory twin.
//!
//! The JSONL file holds two kinds of line: full [`AuditLogEntry`] records
//! and `{"disposition": ...}` records. Readers fold each disposition onto the
//! latest preceding entry with the same prompt hash.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::entry::{AuditLogEntry, Disposition};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("no audit entry for prompt hash {0}")]
    UnknownPrompt(String),

    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type AuditResult<T> = Result<T, AuditError>;

/// Append-only audit storage.
///
/// Only `append`, `record_disposition` and `entries` are required; lookups
/// and windowed scans are derived from the folded entry list.
pub trait AuditStore: Send + Sync {
    /// Append a completed round.
    fn append(&self, entry: &AuditLogEntry) -> AuditResult<()>;

    /// Record a human decision for an already-audited prompt.
    fn record_disposition(&self, disposition: &Disposition) -> AuditResult<()>;

    /// Every entry in append order, dispositions applied.
    fn entries(&self) -> AuditResult<Vec<AuditLogEntry>>;

    /// All entries for a prompt hash, in append order.
    fn find(&self, prompt_hash: &str) -> AuditResult<Vec<AuditLogEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.prompt_hash() == prompt_hash)
            .collect())
    }

    /// Most recently appended entry for a prompt hash.
    fn latest(&self, prompt_hash: &str) -> AuditResult<Option<AuditLogEntry>> {
        Ok(self.find(prompt_hash)?.pop())
    }

    /// Entries from the `days` days up to `as_of`, newest first.
    fn window(&self, days: u32, as_of: DateTime<Utc>) -> AuditResult<Vec<AuditLogEntry>> {
        Ok(window_of(self.entries()?, days, as_of))
    }
}

/// Earliest timestamp inside a `days`-day window ending at `as_of`.
/// Windows reaching past the representable range start at its minimum.
pub fn window_start(days: u32, as_of: DateTime<Utc>) -> DateTime<Utc> {
    as_of
        .checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Keep entries inside `[as_of - days, as_of]` and sort them newest first.
/// Entries with equal timestamps keep reverse append order.
pub fn window_of(
    entries: Vec<AuditLogEntry>,
    days: u32,
    as_of: DateTime<Utc>,
) -> Vec<AuditLogEntry> {
    let cutoff = window_start(days, as_of);
    let mut kept: Vec<AuditLogEntry> = entries
        .into_iter()
        .filter(|e| e.timestamp() >= cutoff && e.timestamp() <= as_of)
        .collect();
    kept.reverse();
    kept.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    kept
}

#[derive(Serialize, Deserialize)]
struct DispositionLine {
    disposition: Disposition,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LogLine {
    Disposition(DispositionLine),
    Entry(Box<AuditLogEntry>),
}

fn fold_disposition(entries: &mut [AuditLogEntry], disposition: &Disposition) -> bool {
    match entries
        .iter_mut()
        .rev()
        .find(|e| e.prompt_hash() == disposition.prompt_hash)
    {
        Some(entry) => {
            entry.apply_disposition(disposition);
            true
        }
        None => false,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// JSONL-backed audit log. One JSON object per line, each written with a
/// single `write_all` while holding the writer lock.
pub struct JsonlAuditLog {
    path: PathBuf,
    writer: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_line(&self, json: String) -> AuditResult<()> {
        let mut line = json;
        line.push('\n');

        let _guard = lock(&self.writer);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn read_folded(&self) -> AuditResult<Vec<AuditLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries: Vec<AuditLogEntry> = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogLine>(&line) {
                Ok(LogLine::Entry(entry)) => entries.push(*entry),
                Ok(LogLine::Disposition(d)) => {
                    if !fold_disposition(&mut entries, &d.disposition) {
                        warn!(
                            line = idx + 1,
                            prompt_hash = %d.disposition.prompt_hash,
                            "Disposition precedes any entry for its prompt; ignoring"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = idx + 1,
                        error = %e,
                        "Skipping malformed audit line"
                    );
                }
            }
        }
        Ok(entries)
    }
}

impl AuditStore for JsonlAuditLog {
    fn append(&self, entry: &AuditLogEntry) -> AuditResult<()> {
        let json = serde_json::to_string(entry)?;
        self.append_line(json)?;
        debug!(
            prompt_hash = %entry.prompt_hash(),
            path = %self.path.display(),
            "Audit entry appended"
        );
        Ok(())
    }

    fn record_disposition(&self, disposition: &Disposition) -> AuditResult<()> {
        if self.latest(&disposition.prompt_hash)?.is_none() {
            return Err(AuditError::UnknownPrompt(disposition.prompt_hash.clone()));
        }
        let json = serde_json::to_string(&DispositionLine {
            disposition: disposition.clone(),
        })?;
        self.append_line(json)?;
        debug!(
            prompt_hash = %disposition.prompt_hash,
            outcome = %disposition.outcome,
            "Disposition recorded"
        );
        Ok(())
    }

    fn entries(&self) -> AuditResult<Vec<AuditLogEntry>> {
        self.read_folded()
    }
}

/// In-memory audit log for tests and embedding.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl AuditStore for MemoryAuditLog {
    fn append(&self, entry: &AuditLogEntry) -> AuditResult<()> {
        lock(&self.entries).push(entry.clone());
        Ok(())
    }

    fn record_disposition(&self, disposition: &Disposition) -> AuditResult<()> {
        let mut entries = lock(&self.entries);
        if fold_disposition(&mut entries, disposition) {
            Ok(())
        } else {
            Err(AuditError::UnknownPrompt(disposition.prompt_hash.clone()))
        }
    }

    fn entries(&self) -> AuditResult<Vec<AuditLogEntry>> {
        Ok(lock(&self.entries).clone())
    }
}

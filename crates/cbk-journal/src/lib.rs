//! cbk-journal
//!
//! Append-only journal of repository mutations. JSON Lines, one entry per
//! line, keys sorted recursively so the same entry always encodes to the
//! same bytes.
//!
//! Optional hash chain: each entry carries `hash_prev` (the previous entry's
//! `hash_self`) and `hash_self` (SHA-256 of the entry's canonical JSON with
//! `hash_self` null). Editing, dropping or reordering any line breaks the
//! chain at that line.
//!
//! Timestamps are passed in by the caller; this crate never reads a clock.

use anyhow::{bail, Context, Result};
use cbk_period::Period;
use cbk_schedule::{ScheduleEvent, ScheduleMaster};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One repository mutation. Replaying these in journal order rebuilds the
/// repository exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalRecord {
    ScheduleCreated {
        schedule: ScheduleMaster,
    },
    EventAppended {
        event: ScheduleEvent,
    },
    PeriodClosed {
        entity_id: String,
        period: Period,
        closed_at: DateTime<Utc>,
    },
}

impl JournalRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            JournalRecord::ScheduleCreated { .. } => "SCHEDULE_CREATED",
            JournalRecord::EventAppended { .. } => "EVENT_APPENDED",
            JournalRecord::PeriodClosed { .. } => "PERIOD_CLOSED",
        }
    }

    /// Schedule the record belongs to; `None` for period closures, which
    /// are entity-wide.
    pub fn schedule_id(&self) -> Option<&str> {
        match self {
            JournalRecord::ScheduleCreated { schedule } => Some(schedule.schedule_id.as_str()),
            JournalRecord::EventAppended { event } => Some(event.schedule_id.as_str()),
            JournalRecord::PeriodClosed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: Uuid,
    /// 1-based position in the journal.
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    pub record: JournalRecord,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Appends entries to a JSONL file, keeping the hash chain and sequence.
pub struct JournalWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Entries written so far; the next entry gets `seq + 1`.
    seq: u64,
}

impl JournalWriter {
    /// Fresh writer. Creates parent dirs; does not touch the file until the
    /// first append.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {:?}", parent))?;
            }
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Writer positioned after the existing entries of `path` (if any).
    ///
    /// Refuses to resume a journal whose chain does not verify: appending to
    /// a broken chain would bless the break.
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut w = Self::new(path, hash_chain)?;
        let entries = read_journal(&w.path)?;

        if hash_chain {
            let content = read_or_empty(&w.path)?;
            if let VerifyResult::Broken { line, reason } = verify_journal_str(&content)? {
                bail!("journal {:?} broken at line {line}: {reason}", w.path);
            }
        }

        if let Some(last) = entries.last() {
            w.seq = last.seq;
            w.last_hash = last.hash_self.clone();
        }
        Ok(w)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Number of entries in the journal.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one record stamped `ts_utc`.
    ///
    /// State (sequence, last hash) only advances once the line is on disk; a
    /// failed write leaves the writer where it was.
    pub fn append(&mut self, ts_utc: DateTime<Utc>, record: JournalRecord) -> Result<JournalEntry> {
        let seq = self.seq + 1;
        let mut entry = JournalEntry {
            entry_id: derive_entry_id(self.last_hash.as_deref(), seq),
            seq,
            ts_utc,
            record,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            entry.hash_prev = self.last_hash.clone();
            let v = serde_json::to_value(&entry).context("serialize journal entry failed")?;
            entry.hash_self = Some(compute_entry_hash(&v)?);
        }

        let line = canonical_json_line(&entry)?;
        append_line(&self.path, &line)?;

        self.seq = seq;
        if self.hash_chain {
            self.last_hash = entry.hash_self.clone();
        }
        Ok(entry)
    }
}

/// Entry id from the chain position. No RNG: the same journal written twice
/// carries the same ids.
pub fn derive_entry_id(hash_prev: Option<&str>, seq: u64) -> Uuid {
    let name = format!("cbk-journal:{}:{}", hash_prev.unwrap_or("genesis"), seq);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open journal {:?}", path))?;
    // One write call per entry so a line is never split across appends.
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    f.write_all(buf.as_bytes())
        .context("write journal line failed")?;
    f.flush().context("flush journal failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Canonical encoding + hashing
// ---------------------------------------------------------------------------

/// Compact JSON with object keys sorted recursively.
pub fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize journal entry failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// SHA-256 of the entry's canonical JSON with `hash_self` set to null.
///
/// Takes the entry as a JSON value so verification does not depend on the
/// record schema of the build doing the checking.
pub fn compute_entry_hash(entry: &Value) -> Result<String> {
    let mut clone = entry.clone();
    match clone.as_object_mut() {
        Some(obj) => {
            obj.insert("hash_self".to_string(), Value::Null);
        }
        None => bail!("journal entry must be a JSON object"),
    }

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Reading + verification
// ---------------------------------------------------------------------------

fn read_or_empty(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("read journal {:?}", path)),
    }
}

/// All entries of the journal at `path`. A missing file is an empty journal.
pub fn read_journal(path: impl AsRef<Path>) -> Result<Vec<JournalEntry>> {
    let content = read_or_empty(path.as_ref())?;
    read_journal_str(&content)
}

/// Parse JSONL content into entries. Blank lines are skipped.
pub fn read_journal_str(content: &str) -> Result<Vec<JournalEntry>> {
    let mut out = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let entry: JournalEntry = serde_json::from_str(trimmed)
            .with_context(|| format!("parse journal entry at line {}", i + 1))?;
        out.push(entry);
    }
    Ok(out)
}

/// Result of chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// Every entry links to its predecessor and hashes to its `hash_self`.
    Valid { lines: usize },
    /// First failure, 1-based line number.
    Broken { line: usize, reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid { .. })
    }
}

/// Verify the journal file at `path`.
pub fn verify_journal(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read journal {:?}", path.as_ref()))?;
    verify_journal_str(&content)
}

/// Verify in-memory JSONL content.
///
/// Checks, per entry: `seq` is previous + 1, `hash_prev` equals the previous
/// `hash_self`, and `hash_self` (when present) matches the recomputed hash.
/// Lines that are not JSON objects are an `Err`, not a broken chain.
pub fn verify_journal_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut prev_seq = 0u64;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lineno = i + 1;

        let v: Value = serde_json::from_str(trimmed)
            .with_context(|| format!("parse journal entry at line {lineno}"))?;
        if !v.is_object() {
            bail!("journal entry at line {lineno} is not a JSON object");
        }
        line_count += 1;

        let seq = v.get("seq").and_then(Value::as_u64);
        if seq != Some(prev_seq + 1) {
            return Ok(VerifyResult::Broken {
                line: lineno,
                reason: format!("seq mismatch: expected {}, got {:?}", prev_seq + 1, seq),
            });
        }
        prev_seq += 1;

        let hash_prev = v.get("hash_prev").and_then(Value::as_str).map(str::to_string);
        if hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: lineno,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, hash_prev
                ),
            });
        }

        let hash_self = v.get("hash_self").and_then(Value::as_str).map(str::to_string);
        if let Some(claimed) = &hash_self {
            let recomputed = compute_entry_hash(&v)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: lineno,
                    reason: format!(
                        "hash_self mismatch: claimed {}, recomputed {}",
                        claimed, recomputed
                    ),
                });
            }
        }

        prev_hash = hash_self;
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

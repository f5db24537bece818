//! Append-only security audit log.
//!
//! One JSON object per line. Each entry carries the SHA-256 of its own body
//! and the hash of the previous entry, so edits and deletions inside a file
//! break the chain. Files rotate once they reach `max_bytes`.

use crate::error::{Error, Result};
use crate::store::restrict_permissions;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const MAX_ROTATIONS: usize = 5;
const CHAIN_START: &str = "CHAIN_START";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSeverity {
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub severity: EventSeverity,
    pub data: serde_json::Value,
    pub prev_hash: String,
    pub hash: String,
}

#[derive(Debug)]
struct ChainState {
    last_seq: u64,
    last_hash: String,
    /// The current file ends without a newline after an interrupted append.
    torn_tail: bool,
}

pub struct AuditLog {
    path: PathBuf,
    max_bytes: u64,
    inner: Mutex<ChainState>,
}

impl AuditLog {
    pub fn open<P: AsRef<Path>>(path: P, max_bytes: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Resume after the last entry that parses. Damaged lines stay in the
        // file for `verify_chain` to report.
        let (last_seq, last_hash) = match Self::read_entries(&path, false)?.last() {
            Some(entry) => (entry.seq, entry.hash.clone()),
            None => (0, CHAIN_START.to_string()),
        };
        let torn_tail = ends_mid_line(&path)
            .map_err(|e| Error::storage(&path, format!("inspect audit log: {e}")))?;
        if torn_tail {
            warn!(path = %path.display(), last_seq, "audit log ends with a partial entry");
        }
        Ok(Self {
            path,
            max_bytes,
            inner: Mutex::new(ChainState {
                last_seq,
                last_hash,
                torn_tail,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(
        &self,
        event_type: &str,
        severity: EventSeverity,
        data: serde_json::Value,
    ) -> Result<AuditEntry> {
        let mut state = self.inner.lock();
        if self.rotate_if_needed()? {
            state.last_hash = CHAIN_START.to_string();
            state.torn_tail = false;
        }
        let seq = state.last_seq + 1;
        let timestamp = Utc::now();
        let body = entry_body(seq, &timestamp, event_type, severity, &data, &state.last_hash);
        let entry = AuditEntry {
            seq,
            timestamp,
            event_type: event_type.to_string(),
            severity,
            data,
            prev_hash: state.last_hash.clone(),
            hash: hash_body(&body),
        };
        self.write_entry(&entry, state.torn_tail)?;
        state.torn_tail = false;
        state.last_seq = seq;
        state.last_hash = entry.hash.clone();
        Ok(entry)
    }

    /// Most recent entries of the current file, newest first. Lines that do
    /// not parse are skipped.
    pub fn read_recent(&self, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
        let mut entries = Self::read_entries(&self.path, false)?;
        entries.reverse();
        if let Some(lim) = limit {
            entries.truncate(lim);
        }
        Ok(entries)
    }

    /// Recompute every hash in the current file and check the links.
    pub fn verify_chain(&self) -> Result<()> {
        let mut prev = CHAIN_START.to_string();
        let mut last_seq = None;
        for entry in Self::read_entries(&self.path, true)? {
            let body = entry_body(
                entry.seq,
                &entry.timestamp,
                &entry.event_type,
                entry.severity,
                &entry.data,
                &entry.prev_hash,
            );
            if entry.prev_hash != prev || hash_body(&body) != entry.hash {
                return Err(self.corrupt(format!("chain broken at seq {}", entry.seq)));
            }
            if last_seq.is_some_and(|s| entry.seq <= s) {
                return Err(self.corrupt(format!("sequence regressed at seq {}", entry.seq)));
            }
            last_seq = Some(entry.seq);
            prev = entry.hash;
        }
        Ok(())
    }

    fn read_entries(path: &Path, strict: bool) -> Result<Vec<AuditEntry>> {
        if !path.exists() {
            return Ok(vec![]);
        }
        let file = File::open(path).map_err(|e| Error::storage(path, format!("open audit log: {e}")))?;
        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| Error::storage(path, format!("read audit log: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) if strict => {
                    return Err(Error::storage(
                        path,
                        format!("malformed audit entry on line {}: {e}", index + 1),
                    ))
                }
                Err(e) => {
                    warn!(path = %path.display(), line = index + 1, "skipping malformed audit entry: {e}");
                }
            }
        }
        Ok(entries)
    }

    fn write_entry(&self, entry: &AuditEntry, torn_tail: bool) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::storage(&self.path, format!("create log dir: {e}")))?;
            }
        }
        let line = serde_json::to_string(entry)
            .map_err(|e| Error::storage(&self.path, format!("serialize audit entry: {e}")))?;
        let created = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::storage(&self.path, format!("open audit log: {e}")))?;
        if created {
            restrict_permissions(&self.path, 0o600);
        }
        // Terminate a partial line so the new entry starts on its own.
        let lead = if torn_tail { "\n" } else { "" };
        writeln!(file, "{lead}{line}")
            .and_then(|_| file.flush())
            .map_err(|e| Error::storage(&self.path, format!("append audit entry: {e}")))
    }

    /// Returns true when the current file was moved aside.
    fn rotate_if_needed(&self) -> Result<bool> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() >= self.max_bytes => {}
            _ => return Ok(false),
        }
        let io = |e: std::io::Error| Error::storage(&self.path, format!("rotate audit log: {e}"));
        for i in (1..=MAX_ROTATIONS).rev() {
            let rotated = self.path_with_suffix(i);
            if rotated.exists() {
                if i == MAX_ROTATIONS {
                    fs::remove_file(&rotated).map_err(io)?;
                } else {
                    fs::rename(&rotated, self.path_with_suffix(i + 1)).map_err(io)?;
                }
            }
        }
        fs::rename(&self.path, self.path_with_suffix(1)).map_err(io)?;
        Ok(true)
    }

    fn path_with_suffix(&self, index: usize) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{index}"));
        self.path.with_file_name(name)
    }

    fn corrupt(&self, reason: String) -> Error {
        Error::storage(&self.path, reason)
    }
}

fn ends_mid_line(path: &Path) -> io::Result<bool> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn entry_body(
    seq: u64,
    timestamp: &DateTime<Utc>,
    event_type: &str,
    severity: EventSeverity,
    data: &serde_json::Value,
    prev_hash: &str,
) -> serde_json::Value {
    serde_json::json!({
        "seq": seq,
        "timestamp": timestamp,
        "event_type": event_type,
        "severity": severity,
        "data": data,
        "prev_hash": prev_hash,
    })
}

fn hash_body(body: &serde_json::Value) -> String {
    hex::encode(Sha256::digest(body.to_string().as_bytes()))
}

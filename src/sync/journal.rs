//! Skip journal
//!
//! Append-only record of every row the coordinator moved past without
//! delivering. One JSON object per line, fsynced after each append, and
//! always written before the watermark commit that skips the row.
//!
//! An append is a single write of whole lines. A crash mid-write can only
//! leave an unterminated last line; readers ignore it and `open` cuts it
//! off before the next append.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crash_point::{maybe_crash, points};

use super::report::SkippedRecord;

/// File name of the journal inside the state directory
pub const JOURNAL_FILE: &str = "skipped.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub cycle_id: Uuid,
    /// RFC 3339, UTC
    pub recorded_at: String,
    #[serde(flatten)]
    pub record: SkippedRecord,
}

impl JournalEntry {
    pub fn new(cycle_id: Uuid, record: SkippedRecord) -> Self {
        Self {
            cycle_id,
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            record,
        }
    }
}

/// Durable sink for skipped records.
///
/// `append` must not return until the entries are durable.
pub trait SkipJournal: Send + Sync {
    fn append(&self, entries: &[JournalEntry]) -> io::Result<()>;
}

pub struct FileSkipJournal {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSkipJournal {
    /// Open or create the journal file, dropping a torn last line
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let content = std::fs::read(&path)?;
        if !content.is_empty() && !content.ends_with(b"\n") {
            let intact = content
                .iter()
                .rposition(|b| *b == b'\n')
                .map_or(0, |i| i + 1);
            file.set_len(intact as u64)?;
            file.sync_all()?;
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Open `skipped.jsonl` inside `state_dir`
    pub fn in_dir(state_dir: &Path) -> io::Result<Self> {
        Self::open(state_dir.join(JOURNAL_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back, oldest first.
    ///
    /// An unterminated last line is an interrupted append and is ignored.
    /// A malformed terminated line is an error.
    pub fn read_all(path: impl AsRef<Path>) -> io::Result<Vec<JournalEntry>> {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let complete = match content.iter().rposition(|b| *b == b'\n') {
            Some(i) => &content[..=i],
            None => &[][..],
        };
        std::str::from_utf8(complete)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            })
            .collect()
    }
}

impl SkipJournal for FileSkipJournal {
    fn append(&self, entries: &[JournalEntry]) -> io::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for entry in entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(buf.as_bytes())?;
        file.sync_all()?;

        maybe_crash(points::JOURNAL_AFTER_APPEND);
        Ok(())
    }
}

/// In-memory journal; clones share entries
#[derive(Debug, Clone, Default)]
pub struct MemorySkipJournal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl MemorySkipJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SkipJournal for MemorySkipJournal {
    fn append(&self, entries: &[JournalEntry]) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(entries);
        Ok(())
    }
}

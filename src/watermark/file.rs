//! File-backed watermark store
//!
//! Location: `<state_dir>/watermark.json`
//!
//! Commit sequence:
//! 1. Write `watermark.json.tmp`, fsync
//! 2. Rename over `watermark.json`
//! 3. fsync the directory
//!
//! A crash at any step leaves either the old or the new document in place.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::crash_point::{maybe_crash, points};
use crate::position::Position;

use super::errors::{WatermarkError, WatermarkResult};
use super::WatermarkStore;

pub const FORMAT_VERSION: u32 = 1;

/// On-disk watermark document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatermarkDocument {
    pub position: Position,
    /// RFC 3339 commit time
    pub committed_at: String,
    /// CRC32 of the position's little-endian bytes
    pub checksum: u32,
    pub format_version: u32,
}

impl WatermarkDocument {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            committed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            checksum: checksum(position),
            format_version: FORMAT_VERSION,
        }
    }

    pub fn verify(&self) -> bool {
        self.checksum == checksum(self.position)
    }
}

fn checksum(position: Position) -> u32 {
    crc32fast::hash(&position.value().to_le_bytes())
}

/// Returns the path to the watermark file
pub fn watermark_path(state_dir: &Path) -> PathBuf {
    state_dir.join("watermark.json")
}

#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
    initial: Position,
}

impl FileWatermarkStore {
    /// Store at `path`; `initial` is returned until the first commit
    pub fn new(path: impl Into<PathBuf>, initial: Position) -> Self {
        Self {
            path: path.into(),
            initial,
        }
    }

    pub fn in_dir(state_dir: &Path, initial: Position) -> Self {
        Self::new(watermark_path(state_dir), initial)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Read the persisted document, `None` when nothing was ever committed
    pub fn read_document(&self) -> WatermarkResult<Option<WatermarkDocument>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WatermarkError::io(
                    format!("read watermark {}", self.path.display()),
                    e,
                ))
            }
        };

        let doc: WatermarkDocument =
            serde_json::from_str(&contents).map_err(|e| WatermarkError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        if doc.format_version != FORMAT_VERSION {
            return Err(WatermarkError::UnsupportedVersion(doc.format_version));
        }
        if !doc.verify() {
            return Err(WatermarkError::Corrupt {
                path: self.path.clone(),
                reason: "checksum mismatch".to_string(),
            });
        }
        Ok(Some(doc))
    }

    fn write_document(&self, doc: &WatermarkDocument) -> WatermarkResult<()> {
        let json = serde_json::to_string_pretty(doc).map_err(|e| WatermarkError::Corrupt {
            path: self.path.clone(),
            reason: format!("serialize: {}", e),
        })?;

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                WatermarkError::io(format!("create state dir {}", parent.display()), e)
            })?;
        }

        let tmp = self.tmp_path();
        let mut file = File::create(&tmp)
            .map_err(|e| WatermarkError::io(format!("create {}", tmp.display()), e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| WatermarkError::io(format!("write {}", tmp.display()), e))?;
        file.sync_all()
            .map_err(|e| WatermarkError::io(format!("fsync {}", tmp.display()), e))?;
        drop(file);

        maybe_crash(points::WATERMARK_BEFORE_RENAME);

        fs::rename(&tmp, &self.path).map_err(|e| {
            WatermarkError::io(
                format!("rename {} -> {}", tmp.display(), self.path.display()),
                e,
            )
        })?;

        maybe_crash(points::WATERMARK_AFTER_RENAME);

        let dir = OpenOptions::new()
            .read(true)
            .open(parent)
            .map_err(|e| WatermarkError::io(format!("open {} for fsync", parent.display()), e))?;
        dir.sync_all()
            .map_err(|e| WatermarkError::io(format!("fsync {}", parent.display()), e))?;

        Ok(())
    }
}

impl WatermarkStore for FileWatermarkStore {
    fn load(&self) -> WatermarkResult<Position> {
        Ok(self
            .read_document()?
            .map(|doc| doc.position)
            .unwrap_or(self.initial))
    }

    fn commit(&self, position: Position) -> WatermarkResult<()> {
        self.write_document(&WatermarkDocument::new(position))
    }
}

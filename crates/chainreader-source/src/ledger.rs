//! Append-only record of how far each tailed file has been read.
//!
//! One record per line, `<path>;<offset>\n`. Replaying keeps the largest
//! offset seen for each path; the last record names the most recently
//! completed file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::SourceError;

pub const LEDGER_FILE_NAME: &str = "file_list.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub path: PathBuf,
    /// Bytes confirmed read; always on a line boundary.
    pub offset: u64,
    /// File size when reading last stopped. Only the offset is persisted,
    /// so a replayed entry starts with `size == offset`.
    pub size: u64,
    pub complete: bool,
}

pub struct FileLedger {
    path: PathBuf,
    file: File,
    entries: HashMap<PathBuf, LedgerEntry>,
    last: Option<LedgerEntry>,
}

impl FileLedger {
    /// Open (or create) the ledger in `dir` and replay it.
    pub async fn open(dir: &Path) -> Result<Self, SourceError> {
        let path = dir.join(LEDGER_FILE_NAME);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(SourceError::Read { path, source }),
        };

        let mut entries: HashMap<PathBuf, LedgerEntry> = HashMap::new();
        let mut last = None;
        let torn_tail = !raw.is_empty() && !raw.ends_with('\n');
        let records: Vec<&str> = raw.lines().collect();

        for (idx, record) in records.iter().enumerate() {
            if record.trim().is_empty() {
                continue;
            }
            let entry = match parse_record(record) {
                Ok(entry) => entry,
                // A crash mid-append leaves an unterminated final record.
                Err(reason) if torn_tail && idx + 1 == records.len() => {
                    warn!(ledger = %path.display(), record, reason, "ignoring torn ledger record");
                    continue;
                }
                Err(reason) => {
                    return Err(SourceError::Ledger {
                        path,
                        line: idx + 1,
                        reason,
                    })
                }
            };

            match entries.get(&entry.path) {
                Some(known) if known.offset >= entry.offset => {}
                _ => {
                    entries.insert(entry.path.clone(), entry.clone());
                }
            }
            last = Some(entry);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| SourceError::LedgerWrite {
                path: path.clone(),
                source,
            })?;
        if torn_tail {
            // Start the next record on a fresh line.
            file.write_all(b"\n")
                .await
                .map_err(|source| SourceError::LedgerWrite {
                    path: path.clone(),
                    source,
                })?;
        }

        debug!(ledger = %path.display(), files = entries.len(), "ledger replayed");
        Ok(Self {
            path,
            file,
            entries,
            last,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn entry(&self, path: &Path) -> Option<&LedgerEntry> {
        self.entries.get(path)
    }

    /// Resume offset for `path`; 0 for unknown files.
    pub fn offset(&self, path: &Path) -> u64 {
        self.entries.get(path).map(|e| e.offset).unwrap_or(0)
    }

    /// The most recently completed file.
    pub fn last(&self) -> Option<&LedgerEntry> {
        self.last.as_ref()
    }

    /// `true` when `path` is the last completed file and is now larger
    /// than when it was completed.
    pub fn is_last_and_grown(&self, path: &Path, size: u64) -> bool {
        matches!(&self.last, Some(last) if last.complete && last.path == path && last.size < size)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }

    /// Mark `path` complete at `offset`, having seen `size` bytes of it.
    ///
    /// The stored offset never decreases. A record is appended only for a
    /// new file or an advanced offset.
    pub async fn record(&mut self, path: &Path, offset: u64, size: u64) -> Result<(), SourceError> {
        let known = self.entries.get(path).map(|e| e.offset);
        let offset = offset.max(known.unwrap_or(0));
        if known.map_or(true, |k| offset > k) {
            let line = format!("{};{}\n", path.display(), offset);
            self.file
                .write_all(line.as_bytes())
                .await
                .map_err(|source| SourceError::LedgerWrite {
                    path: self.path.clone(),
                    source,
                })?;
            self.file
                .sync_data()
                .await
                .map_err(|source| SourceError::LedgerWrite {
                    path: self.path.clone(),
                    source,
                })?;
        } else {
            debug!(path = %path.display(), offset, "offset unchanged, ledger not written");
        }

        let entry = LedgerEntry {
            path: path.to_path_buf(),
            offset,
            size: size.max(offset),
            complete: true,
        };
        self.entries.insert(entry.path.clone(), entry.clone());
        self.last = Some(entry);
        Ok(())
    }
}

fn parse_record(record: &str) -> Result<LedgerEntry, String> {
    let (path, offset) = record
        .rsplit_once(';')
        .ok_or_else(|| format!("expected '<path>;<offset>', got '{record}'"))?;
    if path.is_empty() {
        return Err("empty path".into());
    }
    let offset = offset
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid offset '{offset}': {e}"))?;
    Ok(LedgerEntry {
        path: PathBuf::from(path),
        offset,
        size: offset,
        complete: true,
    })
}

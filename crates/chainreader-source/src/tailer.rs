//! Resumable tailer over a directory of rotating log files.
//!
//! ```text
//!  scan dir ──(pattern, name order)──▶ bounded file queue ──▶ FileReader (watch)
//!     ▲                                                          │
//!     └──────────── FileLedger: path;offset (append-only) ◀──────┘
//! ```
//!
//! A file is queued when the ledger has never seen it, or when it is the
//! most recently completed file and has grown since. Everything runs on one
//! task; the ledger sits behind a mutex so other tasks can inspect it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chainreader_core::config::{check_directory, LogsConfig};
use chainreader_core::{ConfigError, LineSender, Shutdown};
use regex::Regex;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::file_reader::{FileReader, StopReason};
use crate::ledger::{FileLedger, LEDGER_FILE_NAME};

/// Counters reported when the tailer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailStats {
    pub files_read: u64,
    pub lines_sent: u64,
    pub read_errors: u64,
}

pub struct FileTailer {
    dir: PathBuf,
    pattern: Regex,
    poll_interval: Duration,
    max_wait: Duration,
    rescan_interval: Duration,
    ledger: Arc<Mutex<FileLedger>>,
    queue_tx: mpsc::Sender<PathBuf>,
    queue_rx: mpsc::Receiver<PathBuf>,
    /// Queued or being read; not offered again by `scan`.
    in_flight: HashSet<PathBuf>,
    /// Files whose last read failed, with the earliest retry time.
    backoff: HashMap<PathBuf, Instant>,
    stats: TailStats,
}

impl FileTailer {
    /// Validate `config.dir`, compile the pattern, and replay the ledger.
    pub async fn new(config: &LogsConfig) -> Result<Self, SourceError> {
        let dir = config
            .dir
            .clone()
            .ok_or_else(|| ConfigError::Invalid("reader logs dir must be set".into()))?;
        check_directory(&dir)?;
        let pattern = Regex::new(&config.pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: config.pattern.clone(),
            reason: e.to_string(),
        })?;

        let ledger = FileLedger::open(&dir).await?;
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));

        Ok(Self {
            dir,
            pattern,
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
            rescan_interval: config.rescan_interval(),
            ledger: Arc::new(Mutex::new(ledger)),
            queue_tx,
            queue_rx,
            in_flight: HashSet::new(),
            backoff: HashMap::new(),
            stats: TailStats::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ledger(&self) -> Arc<Mutex<FileLedger>> {
        self.ledger.clone()
    }

    pub fn stats(&self) -> TailStats {
        self.stats
    }

    /// List the directory and queue files that need reading, in file-name
    /// order. Returns how many were queued.
    pub async fn scan(&mut self) -> Result<usize, SourceError> {
        let list_err = |source| SourceError::ListDir {
            path: self.dir.clone(),
            source,
        };
        let mut dir = tokio::fs::read_dir(&self.dir).await.map_err(list_err)?;

        let mut found: Vec<(String, PathBuf, u64)> = vec![];
        while let Some(entry) = dir.next_entry().await.map_err(|source| SourceError::ListDir {
            path: self.dir.clone(),
            source,
        })? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == LEDGER_FILE_NAME || !self.pattern.is_match(&name) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    debug!(file = %name, error = %e, "file vanished during scan");
                    continue;
                }
            };
            found.push((name, entry.path(), meta.len()));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));

        let now = Instant::now();
        self.backoff.retain(|_, until| *until > now);

        let ledger = self.ledger.lock().await;
        let mut queued = 0;
        for (_, path, size) in found {
            if self.in_flight.contains(&path) || self.backoff.contains_key(&path) {
                continue;
            }
            if ledger.contains(&path) && !ledger.is_last_and_grown(&path, size) {
                continue;
            }
            match self.queue_tx.try_send(path.clone()) {
                Ok(()) => {
                    debug!(path = %path.display(), size, "file queued");
                    self.in_flight.insert(path);
                    queued += 1;
                }
                // Full: the rest are picked up by a later scan.
                Err(_) => break,
            }
        }
        Ok(queued)
    }

    /// Scan and read until `shutdown` fires.
    ///
    /// Directory-listing and ledger-write failures end the loop with an
    /// error; a failing file is logged and retried after the rescan interval.
    pub async fn run(mut self, lines: LineSender, mut shutdown: Shutdown) -> Result<TailStats, SourceError> {
        info!(dir = %self.dir.display(), pattern = %self.pattern, "file tailer started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.queue_rx.try_recv() {
                Ok(path) => {
                    if self.read_file(path, &lines, &mut shutdown).await? {
                        break;
                    }
                }
                Err(_) => {
                    if self.scan().await? > 0 {
                        continue;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(self.rescan_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        info!(
            files = self.stats.files_read,
            lines = self.stats.lines_sent,
            errors = self.stats.read_errors,
            "file tailer stopped"
        );
        Ok(self.stats)
    }

    /// Read one queued file. Returns `true` when reading was cut short by
    /// shutdown.
    async fn read_file(&mut self, path: PathBuf, lines: &LineSender, shutdown: &mut Shutdown) -> Result<bool, SourceError> {
        let offset = self.ledger.lock().await.offset(&path);
        debug!(path = %path.display(), position = offset, "start reading file");

        let mut reader = FileReader::new(&path, offset).watch(self.poll_interval, self.max_wait);
        let result = reader.read(lines, shutdown).await;
        self.in_flight.remove(&path);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(SourceError::QueueClosed) => return Err(SourceError::QueueClosed),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "file read failed, will retry");
                self.stats.read_errors += 1;
                self.backoff.insert(path, Instant::now() + self.rescan_interval);
                return Ok(false);
            }
        };

        self.stats.lines_sent += outcome.lines;
        self.ledger
            .lock()
            .await
            .record(&path, outcome.position, outcome.seen)
            .await?;

        if outcome.stop == StopReason::Cancelled {
            debug!(path = %path.display(), position = outcome.position, "reading interrupted by shutdown");
            return Ok(true);
        }
        self.stats.files_read += 1;
        info!(path = %path.display(), position = outcome.position, lines = outcome.lines, "finished reading file");
        Ok(false)
    }
}

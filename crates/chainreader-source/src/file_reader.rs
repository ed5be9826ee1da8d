//! Resumable line reader over a single, possibly growing, file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chainreader_core::{LineSender, Shutdown};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::time::Instant;
use tracing::debug;

use crate::error::SourceError;

/// Why [`FileReader::read`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The file was empty when opened.
    Empty,
    /// End of data reached and not watching.
    Eof,
    /// Watching, but the file did not grow within the max wait.
    MaxWait,
    /// Shutdown was requested.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Offset just past the last complete line sent.
    pub position: u64,
    /// Bytes present at the last end of file, including an unterminated
    /// final line. Never below `position`.
    pub seen: u64,
    pub lines: u64,
    pub stop: StopReason,
}

enum Growth {
    Grew,
    TimedOut,
    Cancelled,
}

/// Reads complete lines from `position` onward.
///
/// An unterminated final line is left unread; `position` always sits on a
/// line boundary.
#[derive(Debug, Clone)]
pub struct FileReader {
    path: PathBuf,
    position: u64,
    seen: u64,
    watch: Option<(Duration, Duration)>,
}

impl FileReader {
    pub fn new(path: impl Into<PathBuf>, position: u64) -> Self {
        Self {
            path: path.into(),
            position,
            seen: position,
            watch: None,
        }
    }

    /// After EOF, poll the size every `poll_interval` for up to `max_wait`
    /// and keep reading if the file grows.
    pub fn watch(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.watch = Some((poll_interval, max_wait));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub async fn read(&mut self, lines: &LineSender, shutdown: &mut Shutdown) -> Result<ReadOutcome, SourceError> {
        let mut sent = 0u64;

        if self.size().await? == 0 {
            return Ok(self.outcome(sent, StopReason::Empty));
        }

        let mut reader = self.open_at_position().await?;
        let mut buf = Vec::new();

        loop {
            if shutdown.is_cancelled() {
                return Ok(self.outcome(sent, StopReason::Cancelled));
            }

            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|source| self.read_error(source))?;

            if n > 0 && buf.ends_with(b"\n") {
                self.position += n as u64;
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(&['\n', '\r'][..]).to_string();
                lines.send(line).await.map_err(|_| SourceError::QueueClosed)?;
                sent += 1;
                continue;
            }

            // EOF, possibly after a partial line that stays unread.
            self.seen = self.position + n as u64;
            let Some((poll_interval, max_wait)) = self.watch else {
                return Ok(self.outcome(sent, StopReason::Eof));
            };
            match self.wait_for_growth(self.seen, poll_interval, max_wait, shutdown).await? {
                Growth::Grew => reader = self.open_at_position().await?,
                Growth::TimedOut => return Ok(self.outcome(sent, StopReason::MaxWait)),
                Growth::Cancelled => return Ok(self.outcome(sent, StopReason::Cancelled)),
            }
        }
    }

    fn outcome(&self, lines: u64, stop: StopReason) -> ReadOutcome {
        debug!(path = %self.path.display(), position = self.position, lines, ?stop, "file read stopped");
        ReadOutcome {
            position: self.position,
            seen: self.seen.max(self.position),
            lines,
            stop,
        }
    }

    async fn size(&self) -> Result<u64, SourceError> {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.len())
            .map_err(|source| self.read_error(source))
    }

    async fn open_at_position(&self) -> Result<BufReader<File>, SourceError> {
        let mut file = File::open(&self.path)
            .await
            .map_err(|source| self.read_error(source))?;
        file.seek(SeekFrom::Start(self.position))
            .await
            .map_err(|source| self.read_error(source))?;
        Ok(BufReader::new(file))
    }

    async fn wait_for_growth(
        &self,
        seen: u64,
        poll_interval: Duration,
        max_wait: Duration,
        shutdown: &mut Shutdown,
    ) -> Result<Growth, SourceError> {
        let deadline = Instant::now() + max_wait;
        loop {
            if Instant::now() >= deadline {
                return Ok(Growth::TimedOut);
            }
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.cancelled() => return Ok(Growth::Cancelled),
            }
            if self.size().await? > seen {
                return Ok(Growth::Grew);
            }
        }
    }

    fn read_error(&self, source: std::io::Error) -> SourceError {
        SourceError::Read {
            path: self.path.clone(),
            source,
        }
    }
}

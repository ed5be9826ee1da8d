//! Byte stream → trimmed lines on the bounded line queue.

use chainreader_core::LineSender;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

use crate::error::SourceError;

/// Read `input` to EOF, sending every line (whitespace-trimmed) to `lines`.
///
/// A final line without a trailing newline is still sent. Returns the number
/// of lines sent. Blocks while the queue is full. `buffer_size` is the read
/// buffer capacity and does not bound line length.
pub async fn read_lines<R>(input: R, lines: &LineSender, buffer_size: usize) -> Result<u64, SourceError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::with_capacity(buffer_size.max(1), input);
    let mut buf = Vec::new();
    let mut sent = 0u64;

    debug!("starting line reader");
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await.map_err(|e| {
            debug!(error = %e, "line reader aborted with error");
            SourceError::Io(e)
        })?;
        if n == 0 {
            debug!(lines = sent, "line reader finished reading input");
            return Ok(sent);
        }

        let line = String::from_utf8_lossy(&buf).trim().to_string();
        lines.send(line).await.map_err(|_| SourceError::QueueClosed)?;
        sent += 1;
    }
}

/// Read standard input into the line queue.
pub async fn read_stdin(lines: LineSender, buffer_size: usize) -> Result<u64, SourceError> {
    read_lines(tokio::io::stdin(), &lines, buffer_size).await
}

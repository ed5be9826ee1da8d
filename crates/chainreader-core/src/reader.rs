//! Line queue → finalized blocks.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::assembler::BlockAssembler;
use crate::error::ReaderError;
use crate::parser::LineParser;
use crate::types::Block;

/// Producer half of the bounded line queue. A full queue blocks the producer.
pub type LineSender = mpsc::Sender<String>;
/// Consumer half of the bounded line queue.
pub type LineReceiver = mpsc::Receiver<String>;

/// Create the bounded queue that connects a line source to a [`ConsoleReader`].
pub fn line_channel(capacity: usize) -> (LineSender, LineReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Reads marker lines from a queue and yields one [`Block`] per session.
///
/// The first error ends the stream: a reader that returned `Err` must not be
/// polled again.
pub struct ConsoleReader {
    lines: LineReceiver,
    parser: LineParser,
    assembler: BlockAssembler,
    lines_seen: u64,
}

impl ConsoleReader {
    pub fn new(lines: LineReceiver, parser: LineParser, assembler: BlockAssembler) -> Self {
        Self {
            lines,
            parser,
            assembler,
            lines_seen: 0,
        }
    }

    /// Total lines consumed from the queue, markers and noise alike.
    pub fn lines_seen(&self) -> u64 {
        self.lines_seen
    }

    pub fn last_height(&self) -> u64 {
        self.assembler.last_height()
    }

    /// Wait for the next finalized block.
    ///
    /// Returns `Ok(None)` once every producer has dropped its sender. A block
    /// still open at that point is discarded.
    pub async fn read_block(&mut self) -> Result<Option<Block>, ReaderError> {
        while let Some(raw) = self.lines.recv().await {
            self.lines_seen += 1;
            let line = raw.trim();

            let event = match self.parser.parse(line) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(source) => {
                    return Err(ReaderError::Parse {
                        line: line.to_string(),
                        source,
                    })
                }
            };

            let completed = self
                .assembler
                .push(event)
                .map_err(|source| ReaderError::Parse {
                    line: line.to_string(),
                    source,
                })?;

            if let Some(body) = completed {
                return self.assembler.finalize(body).map(Some);
            }
        }

        if let Some(open) = self.assembler.open_height() {
            debug!(block = open, "line queue closed with an open block");
        }
        info!(lines = self.lines_seen, last_block = self.last_height(), "lines channel has been closed");
        Ok(None)
    }
}

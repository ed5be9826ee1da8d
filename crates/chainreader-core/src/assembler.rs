//! Block assembly state machine.
//!
//! ```text
//!            BEGIN(h), h > last
//!   Idle ───────────────────────▶ Collecting(h)
//!    ▲                               │  BLOCK  → replace body
//!    │        END(h)                 │  TX     → append transaction
//!    └───────────────────────────────┘  VSET   → attach validator updates
//! ```
//!
//! Any other transition is a [`ParseError`]. The assembler does not recover
//! from errors; callers are expected to stop reading.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::encoder::BlockEncoder;
use crate::error::{ParseError, ReaderError};
use crate::parser::ParsedEvent;
use crate::pb;
use crate::types::{timestamp_from_proto, Block};

#[derive(Debug)]
enum State {
    Idle,
    Collecting { height: u64, body: Option<pb::Block> },
}

/// Folds parsed marker events into finalized blocks.
pub struct BlockAssembler {
    encoder: Arc<dyn BlockEncoder>,
    first_streamable_block: u64,
    last_height: u64,
    state: State,
}

impl BlockAssembler {
    pub fn new(encoder: Arc<dyn BlockEncoder>, first_streamable_block: u64) -> Self {
        Self {
            encoder,
            first_streamable_block,
            last_height: 0,
            state: State::Idle,
        }
    }

    /// Height of the last completed block (0 before the first END).
    pub fn last_height(&self) -> u64 {
        self.last_height
    }

    /// Height of the session currently being collected.
    pub fn open_height(&self) -> Option<u64> {
        match self.state {
            State::Idle => None,
            State::Collecting { height, .. } => Some(height),
        }
    }

    /// Apply one event. Returns the completed body when `event` closes a
    /// session; pass it to [`finalize`](Self::finalize).
    pub fn push(&mut self, event: ParsedEvent) -> Result<Option<pb::Block>, ParseError> {
        match (&mut self.state, event) {
            (State::Idle, ParsedEvent::SessionBegin(height)) => {
                if height <= self.last_height {
                    return Err(ParseError::UnexpectedBeginHeight {
                        height,
                        last: self.last_height,
                    });
                }
                self.state = State::Collecting { height, body: None };
                Ok(None)
            }
            (State::Collecting { height, .. }, ParsedEvent::SessionBegin(next)) => {
                Err(ParseError::UnexpectedEvent {
                    kind: "BEGIN",
                    reason: format!("height {next} while block {height} is still open"),
                })
            }
            (State::Idle, other) => Err(ParseError::UnexpectedEvent {
                kind: other.kind().as_str(),
                reason: "no block is open".into(),
            }),
            (State::Collecting { body, .. }, ParsedEvent::BlockHeader(block)) => {
                *body = Some(*block);
                Ok(None)
            }
            (State::Collecting { height, body }, ParsedEvent::Transaction(tx)) => {
                let body = body.as_mut().ok_or_else(|| ParseError::UnexpectedEvent {
                    kind: "TX",
                    reason: format!("no BLOCK header for height {height}"),
                })?;
                body.transactions.push(tx);
                Ok(None)
            }
            (State::Collecting { height, body }, ParsedEvent::ValidatorSetUpdate(vset)) => {
                let body = body.as_mut().ok_or_else(|| ParseError::UnexpectedEvent {
                    kind: "VSET_UPDATE",
                    reason: format!("no BLOCK header for height {height}"),
                })?;
                body.validator_updates = vset.validator_updates;
                Ok(None)
            }
            (State::Collecting { height, body }, ParsedEvent::SessionEnd(end)) => {
                let open = *height;
                if end != open {
                    return Err(ParseError::UnexpectedEndHeight { height: end, open });
                }
                let body = body.take().ok_or(ParseError::MissingHeader { height: open })?;
                self.state = State::Idle;
                self.last_height = open;
                Ok(Some(body))
            }
        }
    }

    /// Build the finalized [`Block`] for a body returned by [`push`](Self::push).
    pub fn finalize(&self, body: pb::Block) -> Result<Block, ReaderError> {
        let number = self.last_height;
        let header = body.header.as_ref();

        if let Some(h) = header {
            if h.height.max(0) as u64 != number {
                warn!(block = number, header_height = h.height, "header height differs from session height");
            }
        }

        let id = header.map(|h| hex::encode_upper(&h.hash)).unwrap_or_default();
        let mut previous_id = header
            .and_then(|h| h.last_block_id.as_ref())
            .map(|b| hex::encode_upper(&b.hash))
            .unwrap_or_default();
        let timestamp = timestamp_from_proto(header.and_then(|h| h.time.as_ref()));

        let mut lib_num = number.saturating_sub(1);
        if number == self.first_streamable_block {
            lib_num = number;
            previous_id.clear();
        }

        let payload = self.encoder.encode(&body)?;
        debug!(block = number, txs = body.transactions.len(), bytes = payload.len(), "block assembled");

        Ok(Block {
            number,
            id,
            previous_id,
            lib_num,
            timestamp,
            payload_kind: self.encoder.payload_kind(),
            payload_version: self.encoder.payload_version(),
            payload,
            body,
        })
    }
}

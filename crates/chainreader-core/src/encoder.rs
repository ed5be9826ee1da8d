//! Block payload encoding and decoding.
//!
//! The assembler does not know the canonical wire form of a block; it is
//! handed a [`BlockEncoder`] at construction time.

use prost::Message;

use crate::error::ReaderError;
use crate::pb;
use crate::types::{Block, PayloadKind, PAYLOAD_VERSION};

/// Turns an assembled block body into its canonical serialized payload.
pub trait BlockEncoder: Send + Sync {
    fn encode(&self, body: &pb::Block) -> Result<Vec<u8>, ReaderError>;

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Cosmos
    }

    fn payload_version(&self) -> u32 {
        PAYLOAD_VERSION
    }
}

/// Default encoder: plain protobuf bytes of the block body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoBlockEncoder;

impl BlockEncoder for ProtoBlockEncoder {
    fn encode(&self, body: &pb::Block) -> Result<Vec<u8>, ReaderError> {
        Ok(body.encode_to_vec())
    }
}

impl<F> BlockEncoder for F
where
    F: Fn(&pb::Block) -> Result<Vec<u8>, String> + Send + Sync,
{
    fn encode(&self, body: &pb::Block) -> Result<Vec<u8>, ReaderError> {
        self(body).map_err(ReaderError::Encode)
    }
}

/// Re-reads the typed body from a block's opaque payload.
///
/// Only cosmos payloads at version 1 are accepted.
pub fn decode_payload(block: &Block) -> Result<pb::Block, ReaderError> {
    if block.payload_kind != PayloadKind::Cosmos {
        return Err(ReaderError::Decode(format!(
            "expected kind cosmos, got {}",
            block.payload_kind
        )));
    }
    if block.payload_version != PAYLOAD_VERSION {
        return Err(ReaderError::Decode(format!(
            "expected version {PAYLOAD_VERSION}, got {}",
            block.payload_version
        )));
    }
    pb::Block::decode(block.payload.as_slice()).map_err(|e| ReaderError::Decode(e.to_string()))
}

//! Finalized block types shared by every stage of the pipeline.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::pb;

/// Payload version written by the default encoder.
pub const PAYLOAD_VERSION: u32 = 1;

// ─── PayloadKind ──────────────────────────────────────────────────────────────

/// Protocol family of an opaque block payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Cosmos,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cosmos => write!(f, "cosmos"),
        }
    }
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// A finalized block, produced once per matched BEGIN…END session.
///
/// Never mutated after the assembler hands it out. `body` keeps the typed
/// sub-elements so sinks such as the indexer can extract attributes without
/// decoding `payload` again.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub number: u64,
    /// Uppercase hex of the header hash.
    pub id: String,
    /// Uppercase hex of the parent hash; empty at the first streamable block.
    pub previous_id: String,
    /// Last irreversible block number at the time this block was produced.
    pub lib_num: u64,
    pub timestamp: DateTime<Utc>,
    pub payload_kind: PayloadKind,
    pub payload_version: u32,
    /// Canonical serialized form produced by the injected encoder.
    pub payload: Vec<u8>,
    pub body: pb::Block,
}

impl Block {
    /// Number of transactions carried by the block.
    pub fn tx_count(&self) -> usize {
        self.body.transactions.len()
    }

    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            number: self.number,
            id: self.id.clone(),
            previous_id: self.previous_id.clone(),
            lib_num: self.lib_num,
            timestamp: self.timestamp,
            tx_count: self.tx_count() as u32,
            payload_size: self.payload.len(),
        }
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.number, self.id)
    }
}

// ─── BlockSummary ─────────────────────────────────────────────────────────────

/// A compact, serializable view of a finalized block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub number: u64,
    pub id: String,
    pub previous_id: String,
    pub lib_num: u64,
    pub timestamp: DateTime<Utc>,
    pub tx_count: u32,
    pub payload_size: usize,
}

/// Converts a protobuf timestamp, falling back to the Unix epoch when absent
/// or out of range.
pub fn timestamp_from_proto(ts: Option<&prost_types::Timestamp>) -> DateTime<Utc> {
    ts.and_then(|t| {
        let nanos = u32::try_from(t.nanos).ok()?;
        Utc.timestamp_opt(t.seconds, nanos).single()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_fallbacks() {
        assert_eq!(timestamp_from_proto(None), DateTime::<Utc>::default());
        let ts = prost_types::Timestamp {
            seconds: 1_650_000_000,
            nanos: 5,
        };
        assert_eq!(timestamp_from_proto(Some(&ts)).timestamp(), 1_650_000_000);
        let bad = prost_types::Timestamp {
            seconds: 0,
            nanos: -1,
        };
        assert_eq!(timestamp_from_proto(Some(&bad)), DateTime::<Utc>::default());
    }

    #[test]
    fn summary_serializes() {
        let block = Block {
            number: 7,
            id: "AA".into(),
            previous_id: "BB".into(),
            lib_num: 6,
            timestamp: DateTime::<Utc>::default(),
            payload_kind: PayloadKind::Cosmos,
            payload_version: PAYLOAD_VERSION,
            payload: vec![1, 2, 3],
            body: pb::Block::default(),
        };
        let json = serde_json::to_value(block.summary()).unwrap();
        assert_eq!(json["number"], 7);
        assert_eq!(json["payload_size"], 3);
        assert_eq!(json["tx_count"], 0);
        assert_eq!(block.to_string(), "#7 (AA)");
    }
}

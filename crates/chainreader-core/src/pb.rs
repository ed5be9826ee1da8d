//! Protobuf payload types carried by marker lines.
//!
//! Field numbers follow the CometBFT/Cosmos block schema emitted by the
//! instrumented node, so payloads decode as-is. Only the fields the pipeline
//! reads are modelled; unknown fields are skipped by `prost`.

use prost_types::{Any, Timestamp};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A full block as assembled from one BEGIN…END session.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Block {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
    #[prost(message, optional, tag = "4")]
    pub result_begin_block: Option<ResponseBeginBlock>,
    #[prost(message, optional, tag = "5")]
    pub result_end_block: Option<ResponseEndBlock>,
    #[prost(message, repeated, tag = "6")]
    pub transactions: Vec<TxResult>,
    #[prost(message, repeated, tag = "7")]
    pub validator_updates: Vec<Validator>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Header {
    #[prost(string, tag = "2")]
    pub chain_id: String,
    #[prost(int64, tag = "3")]
    pub height: i64,
    #[prost(message, optional, tag = "4")]
    pub time: Option<Timestamp>,
    #[prost(message, optional, tag = "5")]
    pub last_block_id: Option<BlockId>,
    #[prost(bytes = "vec", tag = "15")]
    pub hash: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockId {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
}

// ─── Transactions ─────────────────────────────────────────────────────────────

/// One delivered transaction with its execution result.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxResult {
    #[prost(uint64, tag = "1")]
    pub height: u64,
    #[prost(uint32, tag = "2")]
    pub index: u32,
    #[prost(message, optional, tag = "3")]
    pub tx: Option<Tx>,
    #[prost(message, optional, tag = "4")]
    pub result: Option<ResponseDeliverTx>,
    #[prost(bytes = "vec", tag = "5")]
    pub hash: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Tx {
    #[prost(message, optional, tag = "1")]
    pub body: Option<TxBody>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxBody {
    /// Messages as `Any`; the `type_url` is the message type key.
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<Any>,
    #[prost(string, tag = "2")]
    pub memo: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResponseDeliverTx {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "3")]
    pub log: String,
    #[prost(message, repeated, tag = "7")]
    pub events: Vec<Event>,
}

// ─── Events ───────────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Event {
    #[prost(string, tag = "1")]
    pub event_type: String,
    #[prost(message, repeated, tag = "2")]
    pub attributes: Vec<EventAttribute>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventAttribute {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
    #[prost(bool, tag = "3")]
    pub index: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResponseBeginBlock {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<Event>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResponseEndBlock {
    #[prost(message, repeated, tag = "1")]
    pub validator_updates: Vec<Validator>,
    #[prost(message, repeated, tag = "3")]
    pub events: Vec<Event>,
}

// ─── Validators ───────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Validator {
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
    #[prost(int64, tag = "3")]
    pub power: i64,
    #[prost(int64, tag = "4")]
    pub proposer_priority: i64,
}

/// Payload of a VSET_UPDATE marker.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidatorSetUpdates {
    #[prost(message, repeated, tag = "1")]
    pub validator_updates: Vec<Validator>,
}

impl Block {
    /// Block height from the header, or 0 when the header is absent.
    pub fn height(&self) -> u64 {
        self.header.as_ref().map(|h| h.height.max(0) as u64).unwrap_or(0)
    }

    /// Every event in execution order: begin-block, per-transaction, end-block.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        let begin = self.result_begin_block.iter().flat_map(|r| r.events.iter());
        let deliver = self
            .transactions
            .iter()
            .filter_map(|tx| tx.result.as_ref())
            .flat_map(|r| r.events.iter());
        let end = self.result_end_block.iter().flat_map(|r| r.events.iter());
        begin.chain(deliver).chain(end)
    }

    /// `type_url` of every transaction message, in order.
    pub fn message_types(&self) -> impl Iterator<Item = &str> {
        self.transactions
            .iter()
            .filter_map(|tx| tx.tx.as_ref())
            .filter_map(|tx| tx.body.as_ref())
            .flat_map(|body| body.messages.iter())
            .map(|msg| msg.type_url.as_str())
    }
}

//! Index kinds and attribute-key extraction.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use chainreader_core::pb;

use crate::error::IndexError;

pub const EVENT_TYPE_PREFIX: &str = "ET";
pub const EVENT_ORIGIN_PREFIX: &str = "EO";
pub const MESSAGE_TYPE_PREFIX: &str = "MT";

/// Which part of block execution produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventOrigin {
    BeginBlock,
    DeliverTx,
    EndBlock,
}

impl EventOrigin {
    pub const ALL: [EventOrigin; 3] = [Self::BeginBlock, Self::DeliverTx, Self::EndBlock];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeginBlock => "BeginBlock",
            Self::DeliverTx => "DeliverTx",
            Self::EndBlock => "EndBlock",
        }
    }

    /// Origins that emitted at least one event in `block`.
    pub fn present_in(block: &pb::Block) -> BTreeSet<EventOrigin> {
        let mut out = BTreeSet::new();
        if block.result_begin_block.as_ref().is_some_and(|r| !r.events.is_empty()) {
            out.insert(Self::BeginBlock);
        }
        if block.result_end_block.as_ref().is_some_and(|r| !r.events.is_empty()) {
            out.insert(Self::EndBlock);
        }
        let delivered = block
            .transactions
            .iter()
            .filter_map(|tx| tx.result.as_ref())
            .any(|r| !r.events.is_empty());
        if delivered {
            out.insert(Self::DeliverTx);
        }
        out
    }
}

impl fmt::Display for EventOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| format!("unknown event origin '{s}'"))
    }
}

/// The attribute a bundle family indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    EventType,
    EventOrigin,
    MessageType,
    /// All three categories in one bundle, keys prefixed `ET:`, `EO:`, `MT:`.
    Combined,
}

impl IndexKind {
    pub const ALL: [IndexKind; 4] = [
        Self::EventType,
        Self::EventOrigin,
        Self::MessageType,
        Self::Combined,
    ];

    /// Name used as the first component of bundle keys.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::EventType => "eventtype",
            Self::EventOrigin => "eventorigin",
            Self::MessageType => "messagetype",
            Self::Combined => "combined",
        }
    }

    /// Distinct attribute keys carried by `block`.
    pub fn keys(&self, block: &pb::Block) -> BTreeSet<String> {
        match self {
            Self::EventType => block.events().map(|e| e.event_type.clone()).collect(),
            Self::EventOrigin => EventOrigin::present_in(block)
                .into_iter()
                .map(|o| o.as_str().to_string())
                .collect(),
            Self::MessageType => block.message_types().map(str::to_string).collect(),
            Self::Combined => {
                let et = Self::EventType
                    .keys(block)
                    .into_iter()
                    .map(|k| combined_key(EVENT_TYPE_PREFIX, &k));
                let eo = Self::EventOrigin
                    .keys(block)
                    .into_iter()
                    .map(|k| combined_key(EVENT_ORIGIN_PREFIX, &k));
                let mt = Self::MessageType
                    .keys(block)
                    .into_iter()
                    .map(|k| combined_key(MESSAGE_TYPE_PREFIX, &k));
                et.chain(eo).chain(mt).collect()
            }
        }
    }
}

pub fn combined_key(prefix: &str, key: &str) -> String {
    format!("{prefix}:{key}")
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for IndexKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.short_name() == s)
            .ok_or_else(|| IndexError::UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn event(ty: &str) -> pb::Event {
        pb::Event {
            event_type: ty.into(),
            attributes: vec![],
        }
    }

    pub(crate) fn tx(messages: &[&str], events: &[&str]) -> pb::TxResult {
        pb::TxResult {
            tx: Some(pb::Tx {
                body: Some(pb::TxBody {
                    messages: messages
                        .iter()
                        .map(|url| prost_types::Any {
                            type_url: url.to_string(),
                            value: vec![],
                        })
                        .collect(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            result: Some(pb::ResponseDeliverTx {
                events: events.iter().map(|e| event(e)).collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub(crate) fn sample_block() -> pb::Block {
        pb::Block {
            result_begin_block: Some(pb::ResponseBeginBlock {
                events: vec![event("mint"), event("transfer")],
            }),
            result_end_block: Some(pb::ResponseEndBlock::default()),
            transactions: vec![
                tx(&["/cosmos.bank.v1beta1.MsgSend"], &["transfer", "message"]),
                tx(&["/cosmos.bank.v1beta1.MsgSend", "/ibc.core.client.v1.MsgUpdateClient"], &[]),
            ],
            ..Default::default()
        }
    }

    fn keys(kind: IndexKind) -> Vec<String> {
        kind.keys(&sample_block()).into_iter().collect()
    }

    #[test]
    fn event_type_keys_are_distinct() {
        assert_eq!(keys(IndexKind::EventType), ["message", "mint", "transfer"]);
    }

    #[test]
    fn event_origins_require_events() {
        // End block result exists but carries no events.
        assert_eq!(keys(IndexKind::EventOrigin), ["BeginBlock", "DeliverTx"]);
        assert!(IndexKind::EventOrigin.keys(&pb::Block::default()).is_empty());
    }

    #[test]
    fn message_type_keys() {
        assert_eq!(
            keys(IndexKind::MessageType),
            ["/cosmos.bank.v1beta1.MsgSend", "/ibc.core.client.v1.MsgUpdateClient"]
        );
    }

    #[test]
    fn combined_keys_are_prefixed() {
        let keys = keys(IndexKind::Combined);
        assert_eq!(keys.len(), 3 + 2 + 2);
        assert!(keys.contains(&"ET:mint".to_string()));
        assert!(keys.contains(&"EO:DeliverTx".to_string()));
        assert!(keys.contains(&"MT:/cosmos.bank.v1beta1.MsgSend".to_string()));
    }

    #[test]
    fn parse_names() {
        for kind in IndexKind::ALL {
            assert_eq!(kind.short_name().parse::<IndexKind>().unwrap(), kind);
        }
        assert!(matches!(
            "bogus".parse::<IndexKind>(),
            Err(IndexError::UnknownKind(_))
        ));
        assert_eq!("EndBlock".parse::<EventOrigin>().unwrap(), EventOrigin::EndBlock);
        assert!("endblock".parse::<EventOrigin>().is_err());
    }
}

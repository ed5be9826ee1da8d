//! Marker-line grammar.
//!
//! ```text
//! DMLOG BEGIN <HEIGHT>
//! DMLOG BLOCK <BASE64 Block>
//! DMLOG TX <BASE64 TxResult>
//! DMLOG VSET_UPDATE <BASE64 ValidatorSetUpdates>
//! DMLOG END <HEIGHT>
//! ```
//!
//! Lines without the prefix are node log noise and parse to `None`.

use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use prost::Message;

use crate::error::ParseError;
use crate::pb;

/// Marker prefix written by the instrumented node.
pub const DEFAULT_PREFIX: &str = "DMLOG ";

// ─── MarkerKind ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Begin,
    Block,
    Tx,
    ValidatorSetUpdate,
    End,
}

impl MarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Begin => "BEGIN",
            Self::Block => "BLOCK",
            Self::Tx => "TX",
            Self::ValidatorSetUpdate => "VSET_UPDATE",
            Self::End => "END",
        }
    }
}

impl FromStr for MarkerKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BEGIN" => Ok(Self::Begin),
            "BLOCK" => Ok(Self::Block),
            "TX" => Ok(Self::Tx),
            "VSET_UPDATE" => Ok(Self::ValidatorSetUpdate),
            "END" => Ok(Self::End),
            other => Err(ParseError::UnsupportedKind { kind: other.into() }),
        }
    }
}

impl std::fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── ParsedEvent ──────────────────────────────────────────────────────────────

/// One decoded marker line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    SessionBegin(u64),
    SessionEnd(u64),
    BlockHeader(Box<pb::Block>),
    Transaction(pb::TxResult),
    ValidatorSetUpdate(pb::ValidatorSetUpdates),
}

impl ParsedEvent {
    pub fn kind(&self) -> MarkerKind {
        match self {
            Self::SessionBegin(_) => MarkerKind::Begin,
            Self::SessionEnd(_) => MarkerKind::End,
            Self::BlockHeader(_) => MarkerKind::Block,
            Self::Transaction(_) => MarkerKind::Tx,
            Self::ValidatorSetUpdate(_) => MarkerKind::ValidatorSetUpdate,
        }
    }
}

// ─── LineParser ───────────────────────────────────────────────────────────────

/// Stateless marker-line parser.
#[derive(Debug, Clone)]
pub struct LineParser {
    prefix: String,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }

    /// Use a custom marker prefix (including its trailing separator).
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parse one line.
    ///
    /// Returns `Ok(None)` for lines that do not carry the marker prefix. The
    /// remainder is split on single spaces; the first token is the kind and
    /// the second the data. Further tokens are ignored.
    pub fn parse(&self, line: &str) -> Result<Option<ParsedEvent>, ParseError> {
        let Some(rest) = line.strip_prefix(self.prefix.as_str()) else {
            return Ok(None);
        };

        let mut tokens = rest.split(' ');
        let (Some(kind), Some(data)) = (tokens.next(), tokens.next()) else {
            return Err(ParseError::InvalidFormat);
        };

        let kind: MarkerKind = kind.parse()?;
        let event = match kind {
            MarkerKind::Begin => ParsedEvent::SessionBegin(parse_height(kind, data)?),
            MarkerKind::End => ParsedEvent::SessionEnd(parse_height(kind, data)?),
            MarkerKind::Block => ParsedEvent::BlockHeader(Box::new(decode_proto(kind, data)?)),
            MarkerKind::Tx => ParsedEvent::Transaction(decode_proto(kind, data)?),
            MarkerKind::ValidatorSetUpdate => {
                ParsedEvent::ValidatorSetUpdate(decode_proto(kind, data)?)
            }
        };
        Ok(Some(event))
    }
}

fn parse_height(kind: MarkerKind, data: &str) -> Result<u64, ParseError> {
    data.parse::<u64>().map_err(|source| ParseError::InvalidNumber {
        kind: kind.as_str(),
        value: data.to_string(),
        source,
    })
}

fn decode_proto<M: Message + Default>(kind: MarkerKind, data: &str) -> Result<M, ParseError> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|source| ParseError::InvalidBase64 {
            kind: kind.as_str(),
            source,
        })?;
    M::decode(bytes.as_slice()).map_err(|source| ParseError::InvalidPayload {
        kind: kind.as_str(),
        source,
    })
}

//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Failure to interpret a marker line or to fit it into the current block.
///
/// Parse errors are never retried: the stream is treated as corrupt from the
/// first failure onward.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid format")]
    InvalidFormat,

    #[error("invalid data: unsupported kind: {kind}")]
    UnsupportedKind { kind: String },

    #[error("invalid data: {kind} height '{value}': {source}")]
    InvalidNumber {
        kind: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("invalid data: {kind} payload is not base64: {source}")]
    InvalidBase64 {
        kind: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("invalid data: {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: prost::DecodeError,
    },

    #[error("BEGIN height {height} must be greater than last completed height {last}")]
    UnexpectedBeginHeight { height: u64, last: u64 },

    #[error("END height {height} does not match open height {open}")]
    UnexpectedEndHeight { height: u64, open: u64 },

    #[error("unexpected {kind} marker: {reason}")]
    UnexpectedEvent { kind: &'static str, reason: String },

    #[error("block {height} ended without a BLOCK header")]
    MissingHeader { height: u64 },
}

/// Errors raised while turning a line stream into finalized blocks.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("{source} (line: {line:?})")]
    Parse {
        line: String,
        #[source]
        source: ParseError,
    },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl ReaderError {
    /// Returns the underlying parse failure, if any.
    pub fn as_parse(&self) -> Option<&ParseError> {
        match self {
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Configuration rejected before the pipeline starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("node binary path is required in node mode")]
    MissingBinary,

    #[error("node binary '{name}' not found in PATH")]
    BinaryNotFound { name: String },

    #[error("node binary '{path}' is a directory")]
    BinaryIsDirectory { path: String },

    #[error("node binary '{path}' is not executable")]
    NotExecutable { path: String },

    #[error("directory '{path}' does not exist")]
    DirectoryMissing { path: String },

    #[error("'{path}' is not a directory")]
    NotADirectory { path: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("bundle size must be greater than zero")]
    InvalidBundleSize,

    #[error("filter must name at least one key")]
    EmptyFilter,

    #[error("invalid env entry '{entry}', expected KEY=VALUE")]
    InvalidEnv { entry: String },

    #[error("{0}")]
    Invalid(String),
}

/// Errors from an index bundle store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Backend(String),

    #[error("corrupt entry '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Failure while driving blocks from a reader into sinks.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error("Sink '{sink}' failed at block {block_number}: {reason}")]
    Sink {
        sink: String,
        block_number: u64,
        reason: String,
    },
}

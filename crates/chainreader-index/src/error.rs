use thiserror::Error;

use chainreader_core::error::{ConfigError, StoreError};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("corrupt bundle '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("unknown index kind '{0}'")]
    UnknownKind(String),

    #[error("the {kind} index cannot answer {category} filters")]
    UnsupportedFilter { kind: &'static str, category: &'static str },

    #[error("block {block} arrived after block {last} in the {kind} indexer")]
    OutOfOrder { kind: &'static str, block: u64, last: u64 },

    /// No bundle covers the requested block.
    #[error("no {short_name} index available for block {block}")]
    NotIndexed { short_name: String, block: u64 },
}

impl IndexError {
    pub fn is_not_indexed(&self) -> bool {
        matches!(self, Self::NotIndexed { .. })
    }
}

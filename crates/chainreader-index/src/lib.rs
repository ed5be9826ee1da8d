//! chainreader-index — roaring-bitmap block indexes.
//!
//! [`BlockIndexer`] folds finalized blocks into fixed-size bundles, one
//! bitmap per attribute key, and flushes them to an
//! [`IndexStore`](chainreader_core::IndexStore) under
//! `<short_name>/<bundle_size>/<start_block>`.
//! [`FilterEvaluator`] and [`IndexProvider`] answer "which blocks match"
//! from those bundles without touching block payloads.

pub mod bundle;
pub mod error;
pub mod filter;
pub mod indexer;
pub mod kind;
pub mod provider;
pub mod transform;
pub mod unindexed;

pub use bundle::{bundle_key, low_boundary, Bundle};
pub use error::IndexError;
pub use filter::{CombinePolicy, FilterSpec};
pub use indexer::{indexers_from_config, BlockIndexer};
pub use kind::{EventOrigin, IndexKind};
pub use provider::{FilterEvaluator, IndexProvider, NextMatch};
pub use unindexed::find_next_unindexed;

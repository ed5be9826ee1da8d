//! Block indexer: folds finalized blocks into bitmap bundles and flushes
//! each bundle to the store once its range is complete.

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use chainreader_core::config::IndexConfig;
use chainreader_core::error::ConfigError;
use chainreader_core::pb;
use chainreader_core::sink::{BlockSink, BoxError};
use chainreader_core::store::IndexStore;
use chainreader_core::types::Block;

use crate::bundle::{low_boundary, Bundle};
use crate::error::IndexError;
use crate::kind::IndexKind;
use crate::unindexed::find_next_unindexed;

/// Single-writer indexer for one [`IndexKind`].
///
/// Blocks must arrive in strictly increasing order. A bundle is flushed when
/// its last block is added or when a later block lands past its end; ranges
/// skipped by a jump are flushed as empty bundles.
///
/// A bundle is only persisted if the indexer saw every block of it that can
/// exist. When the first block seen is not on a bundle boundary, that first
/// bundle is dropped; blocks below the first streamable block do not count
/// as missing.
pub struct BlockIndexer {
    kind: IndexKind,
    store: Arc<dyn IndexStore>,
    bundle_size: u64,
    start_block: Option<u64>,
    first_streamable_block: u64,
    current: Option<Bundle>,
    first_block: Option<u64>,
    last_block: Option<u64>,
    flushed: u64,
}

impl BlockIndexer {
    pub fn new(store: Arc<dyn IndexStore>, kind: IndexKind, bundle_size: u64) -> Result<Self, IndexError> {
        if bundle_size == 0 {
            return Err(ConfigError::InvalidBundleSize.into());
        }
        Ok(Self {
            kind,
            store,
            bundle_size,
            start_block: None,
            first_streamable_block: 0,
            current: None,
            first_block: None,
            last_block: None,
            flushed: 0,
        })
    }

    /// Ignore blocks below `start`.
    pub fn with_start_block(mut self, start: u64) -> Self {
        self.start_block = Some(start);
        self
    }

    /// Lowest block number the chain produces.
    pub fn with_first_streamable_block(mut self, block: u64) -> Self {
        self.first_streamable_block = block;
        self
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn bundle_size(&self) -> u64 {
        self.bundle_size
    }

    pub fn bundles_flushed(&self) -> u64 {
        self.flushed
    }

    /// Range of the bundle currently accumulating, if any.
    pub fn current_range(&self) -> Option<Range<u64>> {
        self.current.as_ref().map(Bundle::range)
    }

    pub async fn index_block(&mut self, block: &pb::Block, number: u64) -> Result<(), IndexError> {
        let keys = self.kind.keys(block);
        self.add(keys, number).await
    }

    /// Record that `block` carries `keys`.
    pub async fn add<I, K>(&mut self, keys: I, block: u64) -> Result<(), IndexError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        if self.start_block.is_some_and(|start| block < start) {
            debug!(kind = %self.kind, block, "below start block, skipping");
            return Ok(());
        }
        if let Some(last) = self.last_block {
            if block <= last {
                return Err(IndexError::OutOfOrder {
                    kind: self.kind.short_name(),
                    block,
                    last,
                });
            }
        }
        self.last_block = Some(block);
        self.first_block.get_or_insert(block);

        let size = self.bundle_size;
        let mut bundle = match self.current.take() {
            Some(bundle) => bundle,
            None => Bundle::new(low_boundary(block, size), size),
        };
        while block >= bundle.end() {
            let next = Bundle::new(bundle.end(), size);
            self.flush(&bundle).await?;
            bundle = next;
        }

        bundle.add(keys, block);

        if block + 1 == bundle.end() {
            let next = Bundle::new(bundle.end(), size);
            self.flush(&bundle).await?;
            bundle = next;
        }
        self.current = Some(bundle);
        Ok(())
    }

    /// Whether every block of `bundle` that can exist went through this
    /// indexer.
    fn covers(&self, bundle: &Bundle) -> bool {
        self.first_block
            .is_some_and(|first| bundle.start() >= first || first <= self.first_streamable_block)
    }

    async fn flush(&mut self, bundle: &Bundle) -> Result<(), IndexError> {
        if !self.covers(bundle) {
            info!(
                kind = %self.kind,
                start = bundle.start(),
                end = bundle.end(),
                first_block = ?self.first_block,
                "bundle starts before the first indexed block, not persisted"
            );
            return Ok(());
        }
        let key = bundle.key(self.kind.short_name());
        let data = bundle.encode()?;
        let bytes = data.len();
        self.store.put(&key, data).await?;
        self.flushed += 1;
        info!(
            kind = %self.kind,
            key = %key,
            start = bundle.start(),
            end = bundle.end(),
            keys = bundle.keys().count(),
            bytes,
            "bundle flushed"
        );
        Ok(())
    }
}

#[async_trait]
impl BlockSink for BlockIndexer {
    fn name(&self) -> &str {
        self.kind.short_name()
    }

    async fn process_block(&mut self, block: &Block) -> Result<(), BoxError> {
        self.index_block(&block.body, block.number).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BoxError> {
        if let Some(bundle) = self.current.as_ref().filter(|b| !b.is_empty()) {
            info!(
                kind = %self.kind,
                start = bundle.start(),
                end = bundle.end(),
                "partial bundle not flushed"
            );
        }
        Ok(())
    }
}

/// One indexer per configured kind.
///
/// With a configured start block, each indexer resumes from the first block
/// its existing bundles do not cover.
pub async fn indexers_from_config(
    store: Arc<dyn IndexStore>,
    config: &IndexConfig,
    first_streamable_block: u64,
) -> Result<Vec<BlockIndexer>, IndexError> {
    let mut out = Vec::with_capacity(config.kinds.len());
    for name in &config.kinds {
        let kind: IndexKind = name.parse()?;
        let mut indexer = BlockIndexer::new(store.clone(), kind, config.bundle_size)?
            .with_first_streamable_block(first_streamable_block);
        if let Some(start) = config.start_block {
            let mut sizes = config.lookup_sizes.clone();
            if !sizes.contains(&config.bundle_size) {
                sizes.push(config.bundle_size);
            }
            let resume = find_next_unindexed(store.as_ref(), start, &sizes, kind.short_name()).await?;
            info!(kind = %kind, start, resume, "indexer start resolved");
            indexer = indexer.with_start_block(resume);
        }
        out.push(indexer);
    }
    Ok(out)
}

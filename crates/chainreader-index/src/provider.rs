//! Filter evaluation against flushed bundles.

use std::ops::Range;
use std::sync::Arc;

use roaring::RoaringTreemap;
use tracing::debug;

use chainreader_core::store::IndexStore;

use crate::bundle::{bundle_key, low_boundary, Bundle};
use crate::error::IndexError;
use crate::filter::{CombinePolicy, FilterSpec};
use crate::kind::IndexKind;

/// Loads bundles of any of the lookup sizes and evaluates filters on them.
#[derive(Clone)]
pub struct FilterEvaluator {
    store: Arc<dyn IndexStore>,
    lookup_sizes: Vec<u64>,
}

impl FilterEvaluator {
    pub fn new(store: Arc<dyn IndexStore>, lookup_sizes: impl Into<Vec<u64>>) -> Self {
        let mut lookup_sizes = lookup_sizes.into();
        lookup_sizes.retain(|s| *s > 0);
        Self { store, lookup_sizes }
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    pub fn lookup_sizes(&self) -> &[u64] {
        &self.lookup_sizes
    }

    /// The bundle of `short_name` covering `block`, trying sizes in order.
    pub async fn bundle_at(&self, short_name: &str, block: u64) -> Result<Option<Bundle>, IndexError> {
        for &size in &self.lookup_sizes {
            let start = low_boundary(block, size);
            let key = bundle_key(short_name, size, start);
            if let Some(data) = self.store.get(&key).await? {
                return Bundle::decode(&key, start, size, &data).map(Some);
            }
        }
        Ok(None)
    }

    /// Sorted block numbers in `range` matching `spec`, using the narrowest
    /// index able to answer it.
    ///
    /// `Ok(None)` means the index was consulted and nothing matched;
    /// [`IndexError::NotIndexed`] means some block in `range` has no bundle.
    pub async fn filter(&self, spec: &FilterSpec, range: Range<u64>) -> Result<Option<Vec<u64>>, IndexError> {
        self.filter_with(spec, spec.default_kind(), range).await
    }

    /// As [`filter`](Self::filter), against an explicit index kind.
    pub async fn filter_with(
        &self,
        spec: &FilterSpec,
        kind: IndexKind,
        range: Range<u64>,
    ) -> Result<Option<Vec<u64>>, IndexError> {
        let groups = spec.key_groups(kind)?;
        let short_name = kind.short_name();

        let mut out = RoaringTreemap::new();
        let mut block = range.start;
        let mut bundles = 0usize;
        while block < range.end {
            let bundle = self
                .bundle_at(short_name, block)
                .await?
                .ok_or_else(|| IndexError::NotIndexed {
                    short_name: short_name.to_string(),
                    block,
                })?;
            out |= matching(&bundle, &groups, spec.policy);
            bundles += 1;
            block = bundle.end();
        }
        out.remove_range(..range.start);
        out.remove_range(range.end..);

        debug!(%spec, kind = %kind, bundles, matches = out.len(), "filter evaluated");
        Ok(nil_if_empty(&out))
    }
}

/// Blocks of `bundle` that satisfy `groups` under `policy`.
pub fn matching(bundle: &Bundle, groups: &[Vec<String>], policy: CombinePolicy) -> RoaringTreemap {
    let group_union = |keys: &Vec<String>| {
        let mut acc = RoaringTreemap::new();
        for key in keys {
            if let Some(bm) = bundle.get(key) {
                acc |= bm;
            }
        }
        acc
    };

    match policy {
        CombinePolicy::Any => groups.iter().fold(RoaringTreemap::new(), |mut acc, g| {
            acc |= group_union(g);
            acc
        }),
        CombinePolicy::All => groups
            .iter()
            .map(group_union)
            .reduce(|a, b| a & b)
            .unwrap_or_default(),
    }
}

fn nil_if_empty(bitmap: &RoaringTreemap) -> Option<Vec<u64>> {
    if bitmap.is_empty() {
        None
    } else {
        Some(bitmap.iter().collect())
    }
}

/// Result of [`IndexProvider::next_matching`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextMatch {
    Found(u64),
    /// No match before the exclusive bound.
    NotFound,
    /// Scan reached `block`, which no bundle covers.
    PassedIndexBoundary(u64),
}

struct Loaded {
    range: Range<u64>,
    matches: RoaringTreemap,
}

/// Block-by-block navigation over one filter, caching the current bundle.
pub struct IndexProvider {
    evaluator: FilterEvaluator,
    spec: FilterSpec,
    kind: IndexKind,
    groups: Vec<Vec<String>>,
    loaded: Option<Loaded>,
}

impl IndexProvider {
    pub fn new(evaluator: FilterEvaluator, spec: FilterSpec) -> Result<Self, IndexError> {
        let kind = spec.default_kind();
        Self::with_kind(evaluator, spec, kind)
    }

    pub fn with_kind(evaluator: FilterEvaluator, spec: FilterSpec, kind: IndexKind) -> Result<Self, IndexError> {
        let groups = spec.key_groups(kind)?;
        Ok(Self {
            evaluator,
            spec,
            kind,
            groups,
            loaded: None,
        })
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    async fn load(&mut self, block: u64) -> Result<Option<&Loaded>, IndexError> {
        let cached = self.loaded.as_ref().is_some_and(|l| l.range.contains(&block));
        if !cached {
            self.loaded = match self.evaluator.bundle_at(self.kind.short_name(), block).await? {
                Some(bundle) => Some(Loaded {
                    range: bundle.range(),
                    matches: matching(&bundle, &self.groups, self.spec.policy),
                }),
                None => None,
            };
        }
        Ok(self.loaded.as_ref())
    }

    /// Whether some bundle covers `block`.
    pub async fn within_range(&mut self, block: u64) -> Result<bool, IndexError> {
        Ok(self.load(block).await?.is_some())
    }

    pub async fn matches(&mut self, block: u64) -> Result<bool, IndexError> {
        let short_name = self.kind.short_name();
        match self.load(block).await? {
            Some(loaded) => Ok(loaded.matches.contains(block)),
            None => Err(IndexError::NotIndexed {
                short_name: short_name.to_string(),
                block,
            }),
        }
    }

    /// First matching block after `block` and before `exclusive_up_to`.
    pub async fn next_matching(&mut self, block: u64, exclusive_up_to: u64) -> Result<NextMatch, IndexError> {
        let mut from = block.saturating_add(1);
        while from < exclusive_up_to {
            let Some(loaded) = self.load(from).await? else {
                return Ok(NextMatch::PassedIndexBoundary(from));
            };
            let end = loaded.range.end.min(exclusive_up_to);
            if let Some(found) = loaded.matches.iter().find(|n| (from..end).contains(n)) {
                return Ok(NextMatch::Found(found));
            }
            from = loaded.range.end;
        }
        Ok(NextMatch::NotFound)
    }
}

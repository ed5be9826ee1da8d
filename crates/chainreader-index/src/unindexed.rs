//! Resume point lookup over existing bundles.

use chainreader_core::error::StoreError;
use chainreader_core::store::IndexStore;
use tracing::debug;

use crate::bundle::{bundle_key, low_boundary};

/// First block at or after `start` not covered by any bundle of
/// `short_name`, trying each size in `lookup_sizes` in order.
///
/// Walks forward bundle by bundle, so mixing sizes (a 1 000 000 bundle
/// followed by 10 000 bundles) is handled.
pub async fn find_next_unindexed(
    store: &dyn IndexStore,
    start: u64,
    lookup_sizes: &[u64],
    short_name: &str,
) -> Result<u64, StoreError> {
    let mut next = start;
    'walk: loop {
        for &size in lookup_sizes.iter().filter(|s| **s > 0) {
            let base = low_boundary(next, size);
            if store.exists(&bundle_key(short_name, size, base)).await? {
                next = base.saturating_add(size);
                continue 'walk;
            }
        }
        debug!(short_name, start, next, "next unindexed block");
        return Ok(next);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Keys(Mutex<BTreeSet<String>>);

    impl Keys {
        fn with(keys: &[&str]) -> Self {
            Self(Mutex::new(keys.iter().map(|k| k.to_string()).collect()))
        }
    }

    #[async_trait]
    impl IndexStore for Keys {
        async fn put(&self, key: &str, _: Vec<u8>) -> Result<(), StoreError> {
            self.0.lock().unwrap().insert(key.into());
            Ok(())
        }
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(self.0.lock().unwrap().contains(key).then(Vec::new))
        }
        async fn list(&self, _: &str) -> Result<Vec<String>, StoreError> {
            Ok(self.0.lock().unwrap().iter().cloned().collect())
        }
    }

    const SIZES: [u64; 2] = [1000, 100];

    #[tokio::test]
    async fn empty_store_returns_start() {
        let store = Keys::default();
        assert_eq!(find_next_unindexed(&store, 1234, &SIZES, "mt").await.unwrap(), 1234);
    }

    #[tokio::test]
    async fn walks_across_mixed_sizes() {
        let store = Keys::with(&[
            "mt/1000/0000000000",
            "mt/1000/0000001000",
            "mt/100/0000002000",
            "mt/100/0000002100",
            "et/100/0000002200",
        ]);
        assert_eq!(find_next_unindexed(&store, 0, &SIZES, "mt").await.unwrap(), 2200);
        assert_eq!(find_next_unindexed(&store, 1500, &SIZES, "mt").await.unwrap(), 2200);
        assert_eq!(find_next_unindexed(&store, 0, &SIZES, "et").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn start_inside_covered_bundle_moves_to_its_end() {
        let store = Keys::with(&["mt/100/0000000500"]);
        assert_eq!(find_next_unindexed(&store, 550, &SIZES, "mt").await.unwrap(), 600);
    }

    #[tokio::test]
    async fn zero_sizes_are_ignored() {
        let store = Keys::default();
        assert_eq!(find_next_unindexed(&store, 7, &[0], "mt").await.unwrap(), 7);
    }
}

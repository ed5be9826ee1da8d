//! Bitmap bundles: one roaring bitmap per attribute key over a fixed block range.
//!
//! Wire format is a small protobuf envelope; each bitmap is stored in the
//! portable roaring serialization.

use std::collections::BTreeMap;
use std::ops::Range;

use prost::Message;
use roaring::RoaringTreemap;

use crate::error::IndexError;

#[derive(Clone, PartialEq, Message)]
pub struct BundleProto {
    #[prost(uint64, tag = "1")]
    pub start: u64,
    #[prost(uint64, tag = "2")]
    pub size: u64,
    #[prost(message, repeated, tag = "3")]
    pub entries: Vec<BitmapEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BitmapEntry {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "vec", tag = "2")]
    pub bitmap: Vec<u8>,
}

/// `<short_name>/<size>/<start>`, start zero-padded so keys sort numerically.
pub fn bundle_key(short_name: &str, size: u64, start: u64) -> String {
    format!("{short_name}/{size}/{start:010}")
}

/// First block of the bundle of `size` containing `block`.
pub fn low_boundary(block: u64, size: u64) -> u64 {
    block - block % size
}

/// Mapping of attribute key to the blocks in `[start, start + size)` carrying it.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    start: u64,
    size: u64,
    bitmaps: BTreeMap<String, RoaringTreemap>,
}

impl Bundle {
    pub fn new(start: u64, size: u64) -> Self {
        Self {
            start,
            size,
            bitmaps: BTreeMap::new(),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end()
    }

    pub fn contains(&self, block: u64) -> bool {
        self.range().contains(&block)
    }

    pub fn key(&self, short_name: &str) -> String {
        bundle_key(short_name, self.size, self.start)
    }

    pub fn add<I, K>(&mut self, keys: I, block: u64)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        for key in keys {
            self.bitmaps.entry(key.into()).or_default().insert(block);
        }
    }

    pub fn get(&self, key: &str) -> Option<&RoaringTreemap> {
        self.bitmaps.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bitmaps.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.bitmaps.is_empty()
    }

    pub fn encode(&self) -> Result<Vec<u8>, IndexError> {
        let mut entries = Vec::with_capacity(self.bitmaps.len());
        for (key, bitmap) in &self.bitmaps {
            let mut bytes = Vec::with_capacity(bitmap.serialized_size());
            bitmap
                .serialize_into(&mut bytes)
                .map_err(|e| IndexError::Corrupt {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            entries.push(BitmapEntry {
                key: key.clone(),
                bitmap: bytes,
            });
        }
        let proto = BundleProto {
            start: self.start,
            size: self.size,
            entries,
        };
        Ok(proto.encode_to_vec())
    }

    /// Decode bytes read from `store_key`, checking they describe the
    /// expected range.
    pub fn decode(store_key: &str, start: u64, size: u64, data: &[u8]) -> Result<Self, IndexError> {
        let corrupt = |reason: String| IndexError::Corrupt {
            key: store_key.to_string(),
            reason,
        };
        let proto = BundleProto::decode(data).map_err(|e| corrupt(e.to_string()))?;
        if proto.start != start || proto.size != size {
            return Err(corrupt(format!(
                "covers [{}, {}) but key names [{start}, {})",
                proto.start,
                proto.start.saturating_add(proto.size),
                start.saturating_add(size),
            )));
        }

        let mut bundle = Self::new(start, size);
        for entry in proto.entries {
            let bitmap = RoaringTreemap::deserialize_from(&entry.bitmap[..])
                .map_err(|e| corrupt(format!("bitmap '{}': {e}", entry.key)))?;
            bundle.bitmaps.insert(entry.key, bitmap);
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(bundle_key("messagetype", 1000, 5000), "messagetype/1000/0000005000");
        assert_eq!(low_boundary(12_345, 1000), 12_000);
        assert_eq!(low_boundary(12_000, 1000), 12_000);
        assert_eq!(low_boundary(10, 1), 10);
    }

    #[test]
    fn encode_then_decode_preserves_bitmaps() {
        let mut bundle = Bundle::new(100, 10);
        bundle.add(["a", "b"], 101);
        bundle.add(["a"], 109);

        let bytes = bundle.encode().unwrap();
        let back = Bundle::decode("k", 100, 10, &bytes).unwrap();
        assert_eq!(back, bundle);
        assert_eq!(back.get("a").unwrap().iter().collect::<Vec<_>>(), [101, 109]);
        assert_eq!(back.keys().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn empty_bundle_round_trips() {
        let bundle = Bundle::new(0, 1000);
        let back = Bundle::decode("k", 0, 1000, &bundle.encode().unwrap()).unwrap();
        assert!(back.is_empty());
        assert!(back.contains(999));
        assert!(!back.contains(1000));
    }

    #[test]
    fn range_mismatch_is_corrupt() {
        let bytes = Bundle::new(0, 10).encode().unwrap();
        let err = Bundle::decode("x/10/0000000010", 10, 10, &bytes).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(Bundle::decode("k", 0, 10, b"\xff\xff\xff").is_err());
    }
}

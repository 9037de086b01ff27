//! In-process store backend
//!
//! `BTreeMap` keeps keys byte-ordered, which makes reverse range scans a
//! plain bounded range walk. A single RwLock gives batch writes their
//! atomicity: readers can never observe a half-applied batch.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::store::{BatchOp, Store, StoreError, WriteBatch};

/// In-memory reference backend.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Store for MemStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.read().get(key).cloned()
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.inner.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut map = self.inner.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Set(key, value) => {
                    map.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_rev(&self, lower: &[u8], upper: &[u8], limit: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
        if lower >= upper || limit == 0 {
            return Vec::new();
        }
        self.inner
            .read()
            .range(lower.to_vec()..upper.to_vec())
            .rev()
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(k: &str, v: &str) -> (Vec<u8>, Vec<u8>) {
        (k.as_bytes().to_vec(), v.as_bytes().to_vec())
    }

    #[test]
    fn test_set_get_delete() {
        let store = MemStore::new();
        store.set(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a"), Some(b"1".to_vec()));

        store.delete(b"a").unwrap();
        assert_eq!(store.get(b"a"), None);
    }

    #[test]
    fn test_batch_applies_all_ops() {
        let store = MemStore::new();
        store.set(b"gone", b"x").unwrap();

        let mut batch = WriteBatch::new();
        batch.set(b"a".to_vec(), b"1".to_vec());
        batch.set(b"b".to_vec(), b"2".to_vec());
        batch.delete(b"gone".to_vec());
        store.write_batch(batch).unwrap();

        assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b"), Some(b"2".to_vec()));
        assert_eq!(store.get(b"gone"), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_scan_rev_descending_within_bounds() {
        let store = MemStore::new();
        for k in ["k1", "k2", "k3", "k4"] {
            let (key, value) = kv(k, k);
            store.set(&key, &value).unwrap();
        }

        // [k1, k4) descending
        let hits = store.scan_rev(b"k1", b"k4", 10);
        let keys: Vec<&[u8]> = hits.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"k3".as_slice(), b"k2", b"k1"]);
    }

    #[test]
    fn test_scan_rev_respects_limit() {
        let store = MemStore::new();
        for k in ["k1", "k2", "k3"] {
            let (key, value) = kv(k, k);
            store.set(&key, &value).unwrap();
        }

        let hits = store.scan_rev(b"k1", b"k9", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, b"k3".to_vec());
    }

    #[test]
    fn test_scan_rev_empty_range() {
        let store = MemStore::new();
        store.set(b"k1", b"v").unwrap();
        assert!(store.scan_rev(b"z", b"a", 10).is_empty());
        assert!(store.scan_rev(b"k1", b"k1", 10).is_empty());
    }
}

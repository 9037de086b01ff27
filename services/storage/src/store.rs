//! Store contract — ordered keys, atomic batches, reverse scans

use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("store is closed")]
    Closed,
}

// ── Write Batch ─────────────────────────────────────────────────────

/// A set of writes applied atomically by [`Store::write_batch`].
///
/// Either every operation becomes visible or none does; readers never
/// observe a partially applied batch.
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

#[derive(Debug)]
pub(crate) enum BatchOp {
    Set(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Set(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

// ── Store Trait ─────────────────────────────────────────────────────

/// An ordered key-value store with atomic batch writes.
///
/// Keys are compared as raw bytes; the index layout relies on big-endian
/// encodings so that byte order matches logical order.
pub trait Store: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Write a single key.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Remove a single key.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Apply a batch atomically.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Scan `[lower, upper)` in descending key order, at most `limit` pairs.
    fn scan_rev(&self, lower: &[u8], upper: &[u8], limit: usize) -> Vec<(Vec<u8>, Vec<u8>)>;
}

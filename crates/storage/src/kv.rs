use std::collections::HashMap;

use parking_lot::RwLock;

use crate::StorageError;

/// Key-value database contract consumed by the coordinator.
///
/// Implementations must be thread-safe and must apply a [`WriteBatch`]
/// atomically: either every queued operation becomes visible or none do.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Stores `value` under `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Applies every operation in `batch` atomically.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError>;
}

/// An ordered set of writes committed atomically through
/// [`KeyValueStore::write_batch`].
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a put.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push((key, value));
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Commits the batch through `store`.
    pub fn write(self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        store.write_batch(self)
    }

    /// Consumes the batch, yielding its operations in insertion order.
    pub fn into_ops(self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.ops
    }
}

/// In-memory store backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.inner.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        for (key, value) in batch.into_ops() {
            inner.insert(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_commits_every_op() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        assert_eq!(batch.len(), 2);

        batch.write(&store).unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn later_ops_win_within_a_batch() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"k".to_vec(), b"old".to_vec());
        batch.put(b"k".to_vec(), b"new".to_vec());
        batch.write(&store).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"new".to_vec()));
    }
}

use crate::StoreError;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Minimal key/value persistence used for pool entries and section
/// checkpoints.
///
/// Writes must be visible to subsequent reads once `put` returns; the core
/// treats a returned `put` as durable.
#[auto_impl::auto_impl(&, Arc)]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Removes the value under `key`, if present.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;
}

/// An in-memory [`KeyValueStore`].
///
/// Used by tests and by deployments that accept losing checkpoints on
/// restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.map.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get(b"k").unwrap(), None);

        store.put(b"k", b"v1").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v1".to_vec()));

        store.put(b"k", b"v2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));

        store.delete(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }
}

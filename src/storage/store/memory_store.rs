//! An in-memory store.

use parking_lot::RwLock;

use crate::storage::{
    ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey, StoreKeys,
    StorePrefix, WritableStorageTraits,
};

use std::collections::BTreeMap;

/// An in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data_map: RwLock<BTreeMap<StoreKey, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new, empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadableStorageTraits for MemoryStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        Ok(self.data_map.read().get(key).cloned())
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        Ok(self
            .data_map
            .read()
            .get(key)
            .map(|value| value.len() as u64))
    }
}

impl WritableStorageTraits for MemoryStore {
    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StorageError> {
        self.data_map.write().insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.data_map.write().remove(key);
        Ok(())
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        self.data_map
            .write()
            .retain(|key, _| !key.has_prefix(prefix));
        Ok(())
    }
}

impl ListableStorageTraits for MemoryStore {
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        Ok(self
            .data_map
            .read()
            .keys()
            .filter(|&key| key.has_prefix(prefix))
            .cloned()
            .collect())
    }

    fn size_prefix(&self, prefix: &StorePrefix) -> Result<u64, StorageError> {
        Ok(self
            .data_map
            .read()
            .iter()
            .filter(|(key, _)| key.has_prefix(prefix))
            .map(|(_, value)| value.len() as u64)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn memory_set() -> Result<(), Box<dyn Error>> {
        let store = MemoryStore::new();
        let key = "a/b".try_into()?;
        store.set(&key, &[0, 1, 2])?;
        assert_eq!(store.get(&key)?.unwrap(), &[0, 1, 2]);
        assert_eq!(store.size_key(&key)?, Some(3));
        store.set(&key, &[3])?;
        assert_eq!(store.get(&key)?.unwrap(), &[3]);
        Ok(())
    }

    #[test]
    fn memory_list_erase() -> Result<(), Box<dyn Error>> {
        let store = MemoryStore::new();
        store.set(&"a/b".try_into()?, &[0])?;
        store.set(&"a/c/0".try_into()?, &[0, 0])?;
        store.set(&"a/c/1".try_into()?, &[0, 0, 0])?;
        store.set(&"ab/c".try_into()?, &[0])?;

        let prefix: StorePrefix = "a/c/".try_into()?;
        assert_eq!(
            store.list_prefix(&prefix)?,
            vec![StoreKey::new("a/c/0")?, StoreKey::new("a/c/1")?]
        );
        assert_eq!(store.size_prefix(&prefix)?, 5);

        store.erase(&"a/b".try_into()?)?;
        assert!(store.get(&"a/b".try_into()?)?.is_none());

        store.erase_prefix(&"a/".try_into()?)?;
        assert!(store.list_prefix(&"a/".try_into()?)?.is_empty());
        assert!(store.get(&"ab/c".try_into()?)?.is_some());
        Ok(())
    }
}

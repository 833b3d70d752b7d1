//! Hierarchy nodes.
//!
//! A node is either a group or a dataset, addressed by a [`NodePath`].
//! Each node persists a [`NodeMetadata`] document (JSON) at its [metadata key](crate::storage::meta_key).

mod node_metadata;
mod node_name;
mod node_path;

pub use node_metadata::{
    AttributeRecord, AttributeValue, Attributes, DatasetMetadata, GroupMetadata, Layout,
    NodeMetadata,
};
pub use node_name::{NodeName, NodeNameError};
pub use node_path::{NodePath, NodePathError};

use crate::storage::{meta_key, ReadableStorageTraits, StorageError, WritableStorageTraits};

/// Retrieve the metadata of the node at `path`.
///
/// Returns [`None`] if there is no node at `path`.
///
/// # Errors
/// Returns a [`StorageError`] if there is an underlying error with the store or the metadata is invalid.
pub fn retrieve_node_metadata<TStorage: ?Sized + ReadableStorageTraits>(
    storage: &TStorage,
    path: &NodePath,
) -> Result<Option<NodeMetadata>, StorageError> {
    let key = meta_key(path);
    storage
        .get(&key)?
        .map(|metadata| {
            serde_json::from_slice(&metadata)
                .map_err(|err| StorageError::InvalidMetadata(key.clone(), err.to_string()))
        })
        .transpose()
}

/// Store the metadata of the node at `path`, replacing any existing metadata.
///
/// # Errors
/// Returns a [`StorageError`] if there is an underlying error with the store.
pub fn store_node_metadata<TStorage: ?Sized + WritableStorageTraits>(
    storage: &TStorage,
    path: &NodePath,
    metadata: &NodeMetadata,
) -> Result<(), StorageError> {
    let key = meta_key(path);
    let json = serde_json::to_vec_pretty(metadata)
        .map_err(|err| StorageError::InvalidMetadata(key.clone(), err.to_string()))?;
    storage.set(&key, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{store::MemoryStore, StoreKey};

    #[test]
    fn node_metadata_store_retrieve() {
        let store = MemoryStore::new();
        let path = NodePath::new("/group").unwrap();
        assert!(retrieve_node_metadata(&store, &path).unwrap().is_none());

        let metadata = NodeMetadata::Group(GroupMetadata::default());
        store_node_metadata(&store, &path, &metadata).unwrap();
        assert_eq!(
            retrieve_node_metadata(&store, &path).unwrap(),
            Some(metadata)
        );
    }

    #[test]
    fn node_metadata_invalid() {
        let store = MemoryStore::new();
        let path = NodePath::new("/group").unwrap();
        store
            .set(&StoreKey::new("group/node.json").unwrap(), b"{\"node_type\":1}")
            .unwrap();
        assert!(matches!(
            retrieve_node_metadata(&store, &path),
            Err(StorageError::InvalidMetadata(_, _))
        ));
    }
}

//! Key/value storage for the hierarchy backing a [`StoreBackend`](crate::backend::StoreBackend).
//!
//! A [store] is a system that can be used to store and retrieve the node metadata and chunk data of a hierarchy.
//! [`MemoryStore`](store::MemoryStore) and [`FilesystemStore`](store::FilesystemStore) are included.
//!
//! A [storage adapter](storage_adapter) wraps another store and has the same interface as a [store].

pub mod storage_adapter;
mod storage_sync;
pub mod store;
mod store_key;
mod store_prefix;

use thiserror::Error;

use crate::node::{NodeNameError, NodePath, NodePathError};

pub use store_key::{StoreKey, StoreKeyError, StoreKeys};
pub use store_prefix::{StorePrefix, StorePrefixError};

pub use self::storage_sync::{
    erase_node, ListableStorageTraits, ReadableStorageTraits,
    ReadableWritableListableStorageTraits, WritableStorageTraits,
};

/// The type for bytes used in synchronous store set and get methods.
pub type Bytes = Vec<u8>;

/// An alias for bytes which may or may not be available.
///
/// When a value is read from a store, it returns `MaybeBytes` which is [`None`] if the key is not available.
pub type MaybeBytes = Option<Bytes>;

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write operation was attempted on a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An error parsing the metadata for a key.
    #[error("error parsing metadata for {0}: {1}")]
    InvalidMetadata(StoreKey, String),
    /// An invalid store prefix.
    #[error("invalid store prefix {0}")]
    StorePrefixError(#[from] StorePrefixError),
    /// An invalid store key.
    #[error("invalid store key {0}")]
    InvalidStoreKey(#[from] StoreKeyError),
    /// An invalid node path.
    #[error("invalid node path {0}")]
    NodePathError(#[from] NodePathError),
    /// An invalid node name.
    #[error("invalid node name {0}")]
    NodeNameError(#[from] NodeNameError),
}

/// The name of the node metadata document.
pub const NODE_METADATA_FILE: &str = "node.json";

/// Return the node metadata key (`<node prefix>node.json`) given a node path.
#[must_use]
pub fn meta_key(path: &NodePath) -> StoreKey {
    let prefix = node_prefix(path);
    unsafe { StoreKey::new_unchecked(format!("{}{NODE_METADATA_FILE}", prefix.as_str())) }
}

/// Return the prefix of all keys of the node at `path`, empty for the root.
#[must_use]
pub fn node_prefix(path: &NodePath) -> StorePrefix {
    match path.as_str().strip_prefix('/') {
        Some("") | None => unsafe { StorePrefix::new_unchecked("") },
        Some(path) => unsafe { StorePrefix::new_unchecked(format!("{path}/")) },
    }
}

/// Return the prefix holding the chunk data of the node at `path`.
#[must_use]
pub fn data_prefix(path: &NodePath) -> StorePrefix {
    let prefix = node_prefix(path);
    unsafe { StorePrefix::new_unchecked(format!("{}c/", prefix.as_str())) }
}

/// Return the data key given a node path and chunk grid indices.
///
/// Chunk keys are `c` followed by the `/` separated grid indices, e.g. `group/dataset/c/1/0`.
#[must_use]
pub fn data_key(path: &NodePath, chunk_grid_indices: &[u64]) -> StoreKey {
    let prefix = data_prefix(path);
    let indices = chunk_grid_indices
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/");
    let indices = if indices.is_empty() {
        "0".to_string()
    } else {
        indices
    };
    unsafe { StoreKey::new_unchecked(format!("{}{indices}", prefix.as_str())) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_and_data_keys() {
        let root = NodePath::root();
        assert_eq!(meta_key(&root).as_str(), "node.json");
        assert_eq!(data_key(&root, &[0]).as_str(), "c/0");

        let path = NodePath::new("/group/dataset").unwrap();
        assert_eq!(meta_key(&path).as_str(), "group/dataset/node.json");
        assert_eq!(node_prefix(&path).as_str(), "group/dataset/");
        assert_eq!(data_prefix(&path).as_str(), "group/dataset/c/");
        assert_eq!(data_key(&path, &[1, 0, 3]).as_str(), "group/dataset/c/1/0/3");
        assert_eq!(data_key(&path, &[]).as_str(), "group/dataset/c/0");
    }
}

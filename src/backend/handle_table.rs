use std::collections::HashMap;

use crate::{
    chunking::ChunkShape, codec::CompressionLevel, datatype::TypeDescriptor, node::NodePath,
};

use super::{BackendError, Dataspace, Handle, ObjectKind};

/// Dataset creation properties.
#[derive(Clone, Debug, Default)]
pub(super) struct DatasetProperties {
    pub chunk_shape: Option<ChunkShape>,
    pub deflate: Option<CompressionLevel>,
}

/// A resource referenced by a [`Handle`].
#[derive(Clone, Debug)]
pub(super) enum HandleEntry {
    Object { kind: ObjectKind, path: NodePath },
    Space(Dataspace),
    Type(TypeDescriptor),
    Properties(DatasetProperties),
    Attribute { object: NodePath, name: String },
    VlenBuffer(Vec<String>),
}

impl HandleEntry {
    pub(super) const fn kind_name(&self) -> &'static str {
        match self {
            Self::Object { kind, .. } => object_kind_name(*kind),
            Self::Space(_) => "dataspace",
            Self::Type(_) => "datatype",
            Self::Properties(_) => "property list",
            Self::Attribute { .. } => "attribute",
            Self::VlenBuffer(_) => "string buffer",
        }
    }
}

/// The table of open handles of a backend.
#[derive(Debug, Default)]
pub(super) struct HandleTable {
    next: u64,
    entries: HashMap<Handle, HandleEntry>,
}

impl HandleTable {
    pub(super) fn insert(&mut self, entry: HandleEntry) -> Handle {
        self.next += 1;
        let handle = Handle(self.next);
        self.entries.insert(handle, entry);
        handle
    }

    pub(super) fn get(&self, handle: Handle) -> Result<&HandleEntry, BackendError> {
        self.entries
            .get(&handle)
            .ok_or(BackendError::InvalidHandle(handle))
    }

    pub(super) fn get_mut(&mut self, handle: Handle) -> Result<&mut HandleEntry, BackendError> {
        self.entries
            .get_mut(&handle)
            .ok_or(BackendError::InvalidHandle(handle))
    }

    /// Remove `handle` if it refers to a resource named `expected`.
    pub(super) fn remove(
        &mut self,
        handle: Handle,
        expected: &'static str,
    ) -> Result<HandleEntry, BackendError> {
        let actual = self.get(handle)?.kind_name();
        if actual == expected {
            self.entries
                .remove(&handle)
                .ok_or(BackendError::InvalidHandle(handle))
        } else {
            Err(BackendError::WrongHandleKind {
                handle,
                expected,
                actual,
            })
        }
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The resource name of an object handle of `kind`.
pub(super) const fn object_kind_name(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Group => "group",
        ObjectKind::Dataset => "dataset",
    }
}

/// Returns a [`BackendError::WrongHandleKind`] for `entry`.
pub(super) fn wrong_kind(handle: Handle, expected: &'static str, entry: &HandleEntry) -> BackendError {
    BackendError::WrongHandleKind {
        handle,
        expected,
        actual: entry.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Extent;

    #[test]
    fn handle_table() {
        let mut table = HandleTable::default();
        let space = table.insert(HandleEntry::Space(Dataspace::new(Extent::Scalar)));
        let datatype = table.insert(HandleEntry::VlenBuffer(vec![]));
        assert_ne!(space, datatype);
        assert_eq!(table.len(), 2);

        assert!(matches!(
            table.remove(space, "datatype"),
            Err(BackendError::WrongHandleKind { .. })
        ));
        assert!(table.remove(space, "dataspace").is_ok());
        assert!(matches!(
            table.remove(space, "dataspace"),
            Err(BackendError::InvalidHandle(_))
        ));
        assert_eq!(table.len(), 1);
    }
}

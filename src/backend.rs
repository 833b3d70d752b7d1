//! The handle-based interface to the hierarchical storage library.
//!
//! The marshallers in [`dataset`](crate::dataset) and [`attribute`](crate::attribute) talk to storage only through the [`Backend`] trait.
//! Every resource (object, dataspace, datatype, property list, attribute, string buffer) is referenced by an opaque [`Handle`]
//! which must be closed exactly once with the matching close method.
//!
//! [`StoreBackend`] implements [`Backend`] over any [store](crate::storage::store).

mod dataspace;
mod handle_table;
mod region;
mod store_backend;

pub use dataspace::{checked_num_elements, Dataspace, Extent, Hyperslab};
pub use store_backend::StoreBackend;

use derive_more::Display;
use thiserror::Error;

use crate::{
    codec::{DeflateError, InvalidCompressionLevelError},
    datatype::TypeDescriptor,
    node::NodePathError,
    storage::StorageError,
};

/// An opaque reference to an open backend resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("#{_0}")]
pub struct Handle(u64);

impl Handle {
    /// Returns the raw handle identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// The kind of a named object in the hierarchy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum ObjectKind {
    /// A group, which holds other objects.
    #[display("group")]
    Group,
    /// A dataset.
    #[display("dataset")]
    Dataset,
}

/// A backend operation, used to label failures.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
#[allow(missing_docs)]
pub enum BackendOp {
    OpenRoot,
    CreateGroup,
    ObjectKindOf,
    OpenObject,
    CloseObject,
    ExistsAsDataset,
    Unlink,
    CreateSimpleSpace,
    CreateScalarSpace,
    SelectHyperslab,
    SpaceExtent,
    CloseSpace,
    CreateType,
    TypeDescriptor,
    CloseType,
    CreateDatasetProperties,
    SetChunk,
    SetDeflate,
    CloseProperties,
    CreateDataset,
    OpenDataset,
    DatasetSpace,
    DatasetType,
    DatasetStorageSize,
    WriteDataset,
    ReadDataset,
    WriteDatasetStrings,
    ReadDatasetStrings,
    VlenBufferStrings,
    ReclaimVlenBuffer,
    AttributeExists,
    CreateAttribute,
    OpenAttribute,
    DeleteAttribute,
    WriteAttribute,
    WriteAttributeStrings,
    ReadAttribute,
    AttributeSpace,
    AttributeType,
    CloseAttribute,
}

/// A backend error.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The handle is not open.
    #[error("handle {0} is not open")]
    InvalidHandle(Handle),
    /// The handle refers to a different kind of resource.
    #[error("handle {handle} is a {actual}, expected a {expected}")]
    WrongHandleKind {
        /// The handle.
        handle: Handle,
        /// The expected resource kind.
        expected: &'static str,
        /// The actual resource kind.
        actual: &'static str,
    },
    /// No object or attribute with that name exists.
    #[error("{0} does not exist")]
    NotFound(String),
    /// An object or attribute with that name already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// The object is not of the requested kind.
    #[error("{0} is not a {1}")]
    WrongObjectKind(String, ObjectKind),
    /// An argument is not valid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Elements cannot be converted between the two types.
    #[error("cannot convert {from} elements to {to}")]
    TypeConversion {
        /// The source type.
        from: TypeDescriptor,
        /// The destination type.
        to: TypeDescriptor,
    },
    /// A buffer does not match the size of the selection.
    #[error("buffer of {actual} bytes does not match the selection of {expected} bytes")]
    BufferSize {
        /// The expected size in bytes.
        expected: usize,
        /// The actual size in bytes.
        actual: usize,
    },
    /// An invalid node path.
    #[error(transparent)]
    NodePath(#[from] NodePathError),
    /// An invalid compression level.
    #[error(transparent)]
    CompressionLevel(#[from] InvalidCompressionLevelError),
    /// A chunk could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] DeflateError),
    /// A storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A failure injected with [`StoreBackend::inject_fault`].
    #[error("injected failure in {0}")]
    Injected(BackendOp),
}

/// The handle-based hierarchical storage interface.
///
/// Names are resolved relative to a parent object handle (`a/b`), may be absolute (`/a/b`), and `.` refers to the parent itself.
/// Every method that returns a [`Handle`] transfers ownership of it to the caller.
pub trait Backend: Send + Sync {
    /// Resolve the kind of the object `name` relative to `parent`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the object does not exist or `parent` is not an open object.
    fn object_kind_of(&self, parent: Handle, name: &str) -> Result<ObjectKind, BackendError>;

    /// Open the object `name` of kind `kind` relative to `parent`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the object does not exist or is not of kind `kind`.
    fn open_object(
        &self,
        parent: Handle,
        name: &str,
        kind: ObjectKind,
    ) -> Result<Handle, BackendError>;

    /// Close an object handle of kind `kind`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the handle is not an open object of kind `kind`.
    fn close_object(&self, object: Handle, kind: ObjectKind) -> Result<(), BackendError>;

    /// Returns true if `name` relative to `parent` is a dataset.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `name` is malformed or `parent` is not an open object.
    fn exists_as_dataset(&self, parent: Handle, name: &str) -> Result<bool, BackendError>;

    /// Remove the object `name` relative to `parent`, including all of its children and data.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the object does not exist.
    fn unlink(&self, parent: Handle, name: &str) -> Result<(), BackendError>;

    /// Create a simple dataspace with extent `shape`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `shape` is empty.
    fn create_simple_space(&self, shape: &[u64]) -> Result<Handle, BackendError>;

    /// Create a scalar dataspace.
    ///
    /// # Errors
    /// Returns a [`BackendError`] on failure.
    fn create_scalar_space(&self) -> Result<Handle, BackendError>;

    /// Select the hyperslab at `offset` with `count` elements per dimension in a simple dataspace.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the hyperslab is out of bounds or has the wrong rank.
    fn select_hyperslab(
        &self,
        space: Handle,
        offset: &[u64],
        count: &[u64],
    ) -> Result<(), BackendError>;

    /// Returns the extent of a dataspace.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `space` is not an open dataspace.
    fn space_extent(&self, space: Handle) -> Result<Extent, BackendError>;

    /// Close a dataspace handle.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `space` is not an open dataspace.
    fn close_space(&self, space: Handle) -> Result<(), BackendError>;

    /// Create a datatype.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `descriptor` is not [valid](TypeDescriptor::is_valid).
    fn create_type(&self, descriptor: TypeDescriptor) -> Result<Handle, BackendError>;

    /// Returns the descriptor of a datatype.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `datatype` is not an open datatype.
    fn type_descriptor(&self, datatype: Handle) -> Result<TypeDescriptor, BackendError>;

    /// Close a datatype handle.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `datatype` is not an open datatype.
    fn close_type(&self, datatype: Handle) -> Result<(), BackendError>;

    /// Create an empty dataset creation property list (contiguous, uncompressed).
    ///
    /// # Errors
    /// Returns a [`BackendError`] on failure.
    fn create_dataset_properties(&self) -> Result<Handle, BackendError>;

    /// Request a chunked layout with `chunk_shape`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if a chunk extent is zero.
    fn set_chunk(&self, properties: Handle, chunk_shape: &[u64]) -> Result<(), BackendError>;

    /// Request deflate compression at `level` (0-9).
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `level` is out of range.
    fn set_deflate(&self, properties: Handle, level: u32) -> Result<(), BackendError>;

    /// Close a dataset creation property list handle.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `properties` is not an open property list.
    fn close_properties(&self, properties: Handle) -> Result<(), BackendError>;

    /// Create the dataset `name` relative to `parent` and open it.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the dataset already exists, the parent group does not exist, or the properties do not fit the extent.
    fn create_dataset(
        &self,
        parent: Handle,
        name: &str,
        datatype: Handle,
        space: Handle,
        properties: Option<Handle>,
    ) -> Result<Handle, BackendError>;

    /// Open the dataset `name` relative to `parent`.
    ///
    /// The handle is closed with [`close_object`](Backend::close_object) and [`ObjectKind::Dataset`].
    ///
    /// # Errors
    /// Returns a [`BackendError`] if there is no dataset `name`.
    fn open_dataset(&self, parent: Handle, name: &str) -> Result<Handle, BackendError>;

    /// Returns a new handle to the dataspace of a dataset.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `dataset` is not an open dataset.
    fn dataset_space(&self, dataset: Handle) -> Result<Handle, BackendError>;

    /// Returns a new handle to the datatype of a dataset.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `dataset` is not an open dataset.
    fn dataset_type(&self, dataset: Handle) -> Result<Handle, BackendError>;

    /// Returns the number of bytes of stored (possibly compressed) dataset data.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `dataset` is not an open dataset.
    fn dataset_storage_size(&self, dataset: Handle) -> Result<u64, BackendError>;

    /// Write `bytes` of `mem_type` elements to the selection of `file_space`, or to the whole dataset.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the types cannot be converted, the buffer does not match the selection, or storage fails.
    fn write_dataset(
        &self,
        dataset: Handle,
        mem_type: Handle,
        file_space: Option<Handle>,
        bytes: &[u8],
    ) -> Result<(), BackendError>;

    /// Read the whole dataset as `mem_type` elements into `out`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the types cannot be converted, `out` does not match the dataset, or storage fails.
    fn read_dataset(
        &self,
        dataset: Handle,
        mem_type: Handle,
        out: &mut [u8],
    ) -> Result<(), BackendError>;

    /// Write variable-length `strings` to the selection of `file_space`, or to the whole dataset.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the dataset is not a variable-length string dataset or `strings` does not match the selection.
    fn write_dataset_strings(
        &self,
        dataset: Handle,
        mem_type: Handle,
        file_space: Option<Handle>,
        strings: &[&str],
    ) -> Result<(), BackendError>;

    /// Read all variable-length strings of a dataset into a new string buffer.
    ///
    /// The buffer must be released with [`reclaim_vlen_buffer`](Backend::reclaim_vlen_buffer).
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the dataset is not a variable-length string dataset.
    fn read_dataset_strings(&self, dataset: Handle, mem_type: Handle)
        -> Result<Handle, BackendError>;

    /// Returns a copy of the strings held by a string buffer.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `buffer` is not an open string buffer.
    fn vlen_buffer_strings(&self, buffer: Handle) -> Result<Vec<String>, BackendError>;

    /// Release a string buffer.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `buffer` is not an open string buffer.
    fn reclaim_vlen_buffer(&self, buffer: Handle) -> Result<(), BackendError>;

    /// Returns true if `object` has an attribute `name`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `object` is not an open object.
    fn attribute_exists(&self, object: Handle, name: &str) -> Result<bool, BackendError>;

    /// Create the attribute `name` on `object` and open it.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the attribute already exists.
    fn create_attribute(
        &self,
        object: Handle,
        name: &str,
        datatype: Handle,
        space: Handle,
    ) -> Result<Handle, BackendError>;

    /// Open the attribute `name` on `object`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if there is no attribute `name`.
    fn open_attribute(&self, object: Handle, name: &str) -> Result<Handle, BackendError>;

    /// Delete the attribute `name` from `object`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if there is no attribute `name`.
    fn delete_attribute(&self, object: Handle, name: &str) -> Result<(), BackendError>;

    /// Write all elements of an attribute from `bytes` of `mem_type` elements.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the types cannot be converted or `bytes` does not match the attribute.
    fn write_attribute(
        &self,
        attribute: Handle,
        mem_type: Handle,
        bytes: &[u8],
    ) -> Result<(), BackendError>;

    /// Write all elements of a variable-length string attribute.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the attribute is not a variable-length string attribute or `strings` does not match it.
    fn write_attribute_strings(
        &self,
        attribute: Handle,
        mem_type: Handle,
        strings: &[&str],
    ) -> Result<(), BackendError>;

    /// Read all elements of an attribute as `mem_type` elements into `out`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the types cannot be converted or `out` does not match the attribute.
    fn read_attribute(
        &self,
        attribute: Handle,
        mem_type: Handle,
        out: &mut [u8],
    ) -> Result<(), BackendError>;

    /// Returns a new handle to the dataspace of an attribute.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `attribute` is not an open attribute.
    fn attribute_space(&self, attribute: Handle) -> Result<Handle, BackendError>;

    /// Returns a new handle to the datatype of an attribute.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `attribute` is not an open attribute.
    fn attribute_type(&self, attribute: Handle) -> Result<Handle, BackendError>;

    /// Close an attribute handle.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if `attribute` is not an open attribute.
    fn close_attribute(&self, attribute: Handle) -> Result<(), BackendError>;
}

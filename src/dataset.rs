//! Dataset marshalling.
//!
//! Every operation takes a [`Backend`], a `parent` object handle and a dataset `name` relative to the parent.
//! Operations run inside a [`ResourceScope`], so they hold the [critical section](crate::sync::critical_section) for their whole duration and
//! release every dataspace, datatype, property list and dataset handle they open, in reverse order, on every exit path.
//!
//! A write proceeds through these stages, and a failure in any stage skips straight to releasing resources:
//!  1. check the payload and resolve its type ([`Element::type_descriptor`]),
//!  2. create the dataspace,
//!  3. create the datatype (and property list, for chunked layouts),
//!  4. create (or reopen) the dataset,
//!  5. transfer the payload.
//!
//! Replace operations ([`replace_dataset`], [`write_string_dataset`], [`write_variable_string_dataset`]) reuse an existing dataset with the same type and extent.
//! An existing dataset with a different type or extent is handled according to the global [`ReplacePolicy`].
//!
//! ### Example
//! ```
//! # use std::sync::Arc;
//! # use h5marshal::{backend::StoreBackend, dataset, storage::store::MemoryStore};
//! let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
//! let root = backend.open_root()?;
//! let data: Vec<i32> = (0..12).map(|i| i * 5).collect();
//! dataset::write_dataset(&backend, root, "data", &[4, 3], &data)?;
//! assert_eq!(dataset::read_dataset::<_, i32>(&backend, root, "data")?, data);
//! assert_eq!(dataset::dataset_shape(&backend, root, "data")?, vec![4, 3]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::borrow::Cow;

use crate::{
    backend::{checked_num_elements, Backend, Extent, Handle, ObjectKind},
    chunking::plan_chunks,
    config::{global_config, ErrorReportingSuppressed, ReplacePolicy},
    datatype::{Element, TypeClass, TypeDescriptor, UnsupportedTypeError},
    guard::{ResourceKind, ResourceScope},
    sync::critical_section,
    MarshalError,
};

const DATASET: ResourceKind = ResourceKind::Object(ObjectKind::Dataset);

/// The shape, type class and type size of a dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetInfo {
    /// The shape. A scalar string dataset has the shape `[type size]`.
    pub shape: Vec<u64>,
    /// The type class.
    pub type_class: TypeClass,
    /// The size in bytes of one element, [`None`] for variable-length strings.
    pub type_size: Option<usize>,
}

#[derive(Clone, Copy)]
enum Payload<'a> {
    Bytes(&'a [u8]),
    Strings(&'a [&'a str]),
}

struct Chunking<'a> {
    chunk_shape: &'a [u64],
    deflate: Option<u32>,
}

/// Returns the shape reported for a dataset or attribute.
///
/// A rank 0 string is reported as rank 1 with the size of its type (1 for a variable-length string).
pub(crate) fn reported_shape(descriptor: &TypeDescriptor, extent: &Extent) -> Vec<u64> {
    match extent {
        Extent::Scalar if descriptor.type_class() == TypeClass::String => {
            vec![descriptor.size().map_or(1, |size| size as u64)]
        }
        extent => extent.shape().to_vec(),
    }
}

/// Returns the number of elements of `extent` as a [`usize`].
pub(crate) fn element_count<B: Backend + ?Sized>(
    scope: &ResourceScope<'_, B>,
    extent: &Extent,
) -> Result<usize, MarshalError> {
    extent
        .checked_num_elements()
        .and_then(|num_elements| usize::try_from(num_elements).ok())
        .ok_or_else(|| scope.shape_mismatch(format!("{extent:?} does not fit in memory")))
}

/// Check an element payload against `shape` and resolve its type.
pub(crate) fn element_payload<B: Backend + ?Sized, T: Element>(
    scope: &ResourceScope<'_, B>,
    shape: &[u64],
    data: &[T],
) -> Result<TypeDescriptor, MarshalError> {
    if data.is_empty() {
        return Err(scope.empty_payload());
    }
    let descriptor = T::type_descriptor().map_err(|err| scope.unsupported_type(err))?;
    let num_elements = checked_num_elements(shape);
    if shape.is_empty() || num_elements != Some(data.len() as u64) {
        return Err(scope.shape_mismatch(format!(
            "{} elements do not fill shape {shape:?}",
            data.len()
        )));
    }
    Ok(descriptor)
}

pub(crate) fn create_space<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    extent: &Extent,
) -> Result<Handle, MarshalError> {
    let backend = scope.backend();
    let space = match extent {
        Extent::Scalar => backend.create_scalar_space(),
        Extent::Simple(shape) => backend.create_simple_space(shape),
    };
    scope.acquire(ResourceKind::Dataspace, space)
}

/// Create and open a new dataset. Returns the dataset and its datatype.
fn create_dataset<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    parent: Handle,
    name: &str,
    descriptor: TypeDescriptor,
    extent: &Extent,
    chunking: Option<Chunking>,
) -> Result<(Handle, Handle), MarshalError> {
    let backend = scope.backend();
    let space = create_space(scope, extent)?;
    let datatype = scope.acquire(ResourceKind::Datatype, backend.create_type(descriptor))?;
    let properties = match chunking {
        None => None,
        Some(Chunking {
            chunk_shape,
            deflate,
        }) => {
            let properties = scope.acquire(
                ResourceKind::DatasetProperties,
                backend.create_dataset_properties(),
            )?;
            backend
                .set_chunk(properties, chunk_shape)
                .map_err(|err| scope.resource_create(ResourceKind::DatasetProperties, err))?;
            if let Some(level) = deflate {
                backend
                    .set_deflate(properties, level)
                    .map_err(|err| scope.resource_create(ResourceKind::DatasetProperties, err))?;
            }
            Some(properties)
        }
    };
    let dataset = scope.acquire(
        DATASET,
        backend.create_dataset(parent, name, datatype, space, properties),
    )?;
    Ok((dataset, datatype))
}

fn transfer<B: Backend + ?Sized>(
    scope: &ResourceScope<'_, B>,
    dataset: Handle,
    mem_type: Handle,
    file_space: Option<Handle>,
    payload: Payload,
) -> Result<(), MarshalError> {
    let backend = scope.backend();
    match payload {
        Payload::Bytes(bytes) => backend.write_dataset(dataset, mem_type, file_space, bytes),
        Payload::Strings(strings) => {
            backend.write_dataset_strings(dataset, mem_type, file_space, strings)
        }
    }
    .map_err(|err| scope.transfer(err))
}

fn write_new<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    parent: Handle,
    name: &str,
    descriptor: TypeDescriptor,
    extent: &Extent,
    chunking: Option<Chunking>,
    payload: Payload,
) -> Result<(), MarshalError> {
    let (dataset, datatype) = create_dataset(scope, parent, name, descriptor, extent, chunking)?;
    transfer(scope, dataset, datatype, None, payload)
}

fn write_replace<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    parent: Handle,
    name: &str,
    descriptor: TypeDescriptor,
    extent: &Extent,
    payload: Payload,
) -> Result<(), MarshalError> {
    let backend = scope.backend();
    let exists = backend
        .exists_as_dataset(parent, name)
        .map_err(|err| scope.object_resolution(err))?;
    if exists {
        let dataset = open_dataset(scope, parent, name)?;
        let (stored_descriptor, stored_extent) = stored_layout(scope, dataset)?;
        if stored_descriptor == descriptor && &stored_extent == extent {
            let datatype = scope.acquire(ResourceKind::Datatype, backend.create_type(descriptor))?;
            return transfer(scope, dataset, datatype, None, payload);
        }
        let replace_policy = global_config().replace_policy();
        match replace_policy {
            ReplacePolicy::Reject => {
                return Err(scope.shape_mismatch(format!(
                    "the existing {stored_descriptor} dataset with extent {stored_extent:?} does not match the {descriptor} payload with extent {extent:?}"
                )));
            }
            ReplacePolicy::Recreate => {
                scope.release(dataset)?;
                backend
                    .unlink(parent, name)
                    .map_err(|err| scope.resource_create(DATASET, err))?;
            }
        }
    }
    write_new(scope, parent, name, descriptor, extent, None, payload)
}

fn open_dataset<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    parent: Handle,
    name: &str,
) -> Result<Handle, MarshalError> {
    let backend = scope.backend();
    scope.acquire(DATASET, backend.open_dataset(parent, name))
}

/// Returns the stored type and extent of an open dataset.
fn stored_layout<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    dataset: Handle,
) -> Result<(TypeDescriptor, Extent), MarshalError> {
    let backend = scope.backend();
    let datatype = scope.acquire(ResourceKind::Datatype, backend.dataset_type(dataset))?;
    let descriptor = backend
        .type_descriptor(datatype)
        .map_err(|err| scope.object_resolution(err))?;
    scope.release(datatype)?;
    let space = scope.acquire(ResourceKind::Dataspace, backend.dataset_space(dataset))?;
    let extent = backend
        .space_extent(space)
        .map_err(|err| scope.object_resolution(err))?;
    scope.release(space)?;
    Ok((descriptor, extent))
}

fn read_elements<B: Backend + ?Sized, T: Element>(
    scope: &mut ResourceScope<'_, B>,
    parent: Handle,
    name: &str,
    expected_len: Option<usize>,
) -> Result<Vec<T>, MarshalError> {
    let backend = scope.backend();
    let descriptor = T::type_descriptor().map_err(|err| scope.unsupported_type(err))?;
    let element_size = descriptor
        .size()
        .ok_or_else(|| scope.unsupported_type(UnsupportedTypeError(T::KIND)))?;
    let dataset = open_dataset(scope, parent, name)?;
    let (_, extent) = stored_layout(scope, dataset)?;
    let num_elements = element_count(scope, &extent)?;
    if let Some(expected_len) = expected_len {
        if expected_len != num_elements {
            return Err(scope.shape_mismatch(format!(
                "the dataset has {num_elements} elements, expected {expected_len}"
            )));
        }
    }
    let datatype = scope.acquire(ResourceKind::Datatype, backend.create_type(descriptor))?;
    let mut bytes = vec![0; num_elements * element_size];
    backend
        .read_dataset(dataset, datatype, &mut bytes)
        .map_err(|err| scope.transfer(err))?;
    T::from_bytes(&bytes).map_err(|err| scope.transfer(err))
}

/// Read all records of an open variable-length string dataset. The string buffer is always reclaimed.
fn read_strings<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    dataset: Handle,
) -> Result<Vec<String>, MarshalError> {
    let backend = scope.backend();
    let datatype = scope.acquire(
        ResourceKind::Datatype,
        backend.create_type(TypeDescriptor::VariableString),
    )?;
    let buffer = backend
        .read_dataset_strings(dataset, datatype)
        .map_err(|err| scope.transfer(err))?;
    scope.track(ResourceKind::VlenBuffer, buffer);
    let strings = backend
        .vlen_buffer_strings(buffer)
        .map_err(|err| scope.transfer(err));
    let reclaimed = scope.release(buffer);
    let strings = strings?;
    reclaimed?;
    Ok(strings)
}

fn read_string<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    parent: Handle,
    name: &str,
) -> Result<String, MarshalError> {
    let backend = scope.backend();
    let dataset = open_dataset(scope, parent, name)?;
    let (descriptor, extent) = stored_layout(scope, dataset)?;
    match descriptor {
        TypeDescriptor::FixedString { size } => {
            let datatype = scope.acquire(ResourceKind::Datatype, backend.create_type(descriptor))?;
            let mut bytes = vec![0; element_count(scope, &extent)? * size];
            backend
                .read_dataset(dataset, datatype, &mut bytes)
                .map_err(|err| scope.transfer(err))?;
            let length = bytes.iter().position(|&byte| byte == 0).unwrap_or(bytes.len());
            bytes.truncate(length);
            String::from_utf8(bytes).map_err(|err| scope.transfer(err))
        }
        TypeDescriptor::VariableString => {
            let num_elements = extent.num_elements();
            if num_elements > 1 {
                return Err(scope.shape_mismatch(format!(
                    "the dataset holds {num_elements} strings, expected one"
                )));
            }
            Ok(read_strings(scope, dataset)?.pop().unwrap_or_default())
        }
        TypeDescriptor::Numeric { tag } => Err(scope.shape_mismatch(format!(
            "the dataset holds {tag} elements, not a string"
        ))),
    }
}

fn dataset_layout<B: Backend + ?Sized>(
    backend: &B,
    operation: &'static str,
    parent: Handle,
    name: &str,
) -> Result<(TypeDescriptor, Extent), MarshalError> {
    ResourceScope::run(backend, operation, name, |scope| {
        let dataset = open_dataset(scope, parent, name)?;
        stored_layout(scope, dataset)
    })
}

/// Create the dataset `name` with `shape` and write `data` to it.
///
/// # Errors
/// Returns a [`MarshalError`] if:
///  - `data` is empty ([`NullOrEmptyPayload`](MarshalError::NullOrEmptyPayload)),
///  - the shape does not match the number of elements ([`ShapeMismatch`](MarshalError::ShapeMismatch)),
///  - the dataset exists or cannot be created ([`ResourceCreate`](MarshalError::ResourceCreate)), or
///  - the write or a close fails.
pub fn write_dataset<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    name: &str,
    shape: &[u64],
    data: &[T],
) -> Result<(), MarshalError> {
    ResourceScope::run(backend, "write_dataset", name, |scope| {
        let descriptor = element_payload(scope, shape, data)?;
        write_new(
            scope,
            parent,
            name,
            descriptor,
            &Extent::Simple(shape.to_vec()),
            None,
            Payload::Bytes(&T::to_bytes(data)),
        )
    })
}

/// Create the rank 1 dataset `name` holding the elements of an array.
///
/// # Errors
/// See [`write_dataset`].
pub fn write_array_dataset<B: Backend + ?Sized, T: Element, const N: usize>(
    backend: &B,
    parent: Handle,
    name: &str,
    data: &[T; N],
) -> Result<(), MarshalError> {
    write_dataset(backend, parent, name, &[N as u64], data)
}

/// Create the dataset `name` holding a single value.
///
/// Scalars are stored with the extent `[1]`.
///
/// # Errors
/// See [`write_dataset`].
pub fn write_scalar_dataset<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    name: &str,
    value: T,
) -> Result<(), MarshalError> {
    write_dataset(backend, parent, name, &[1], std::slice::from_ref(&value))
}

/// Write `data` with `shape` to the dataset `name`, creating it if it does not exist.
///
/// An existing dataset with the same type and extent is overwritten in place.
///
/// # Errors
/// Returns a [`MarshalError`] on the failures of [`write_dataset`], and
/// [`ShapeMismatch`](MarshalError::ShapeMismatch) if the existing dataset differs and the [`ReplacePolicy`] is [`Reject`](ReplacePolicy::Reject).
pub fn replace_dataset<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    name: &str,
    shape: &[u64],
    data: &[T],
) -> Result<(), MarshalError> {
    ResourceScope::run(backend, "replace_dataset", name, |scope| {
        let descriptor = element_payload(scope, shape, data)?;
        write_replace(
            scope,
            parent,
            name,
            descriptor,
            &Extent::Simple(shape.to_vec()),
            Payload::Bytes(&T::to_bytes(data)),
        )
    })
}

/// Create the chunked dataset `name` compressed with deflate at `compression_level` (0-9) and write `data` to it.
///
/// # Errors
/// Returns a [`MarshalError`] on the failures of [`write_dataset`].
/// An invalid chunk shape or compression level fails with [`ResourceCreate`](MarshalError::ResourceCreate).
pub fn write_dataset_compressed<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    name: &str,
    shape: &[u64],
    data: &[T],
    chunk_shape: &[u64],
    compression_level: u32,
) -> Result<(), MarshalError> {
    ResourceScope::run(backend, "write_dataset_compressed", name, |scope| {
        let descriptor = element_payload(scope, shape, data)?;
        write_new(
            scope,
            parent,
            name,
            descriptor,
            &Extent::Simple(shape.to_vec()),
            Some(Chunking {
                chunk_shape,
                deflate: Some(compression_level),
            }),
            Payload::Bytes(&T::to_bytes(data)),
        )
    })
}

/// Create the chunked and compressed dataset `name` and write `data` to it.
///
/// The chunk shape is chosen by [`plan_chunks`] and the compression level is the configured [compression level](crate::config::Config#compression-level).
///
/// # Errors
/// Returns a [`MarshalError`] on the failures of [`write_dataset`].
pub fn write_dataset_compressed_auto<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    name: &str,
    shape: &[u64],
    data: &[T],
) -> Result<(), MarshalError> {
    ResourceScope::run(backend, "write_dataset_compressed_auto", name, |scope| {
        let descriptor = element_payload(scope, shape, data)?;
        let element_size = descriptor
            .size()
            .ok_or_else(|| scope.unsupported_type(UnsupportedTypeError(T::KIND)))?;
        let chunk_shape = plan_chunks(shape, element_size);
        let compression_level = global_config().compression_level().as_u32();
        write_new(
            scope,
            parent,
            name,
            descriptor,
            &Extent::Simple(shape.to_vec()),
            Some(Chunking {
                chunk_shape: &chunk_shape,
                deflate: Some(compression_level),
            }),
            Payload::Bytes(&T::to_bytes(data)),
        )
    })
}

/// Write `text` to the scalar fixed-length string dataset `name`, creating or replacing it.
///
/// The string type is `text.len() + 1` bytes, including the null terminator.
///
/// # Errors
/// Returns a [`MarshalError`] if the dataset cannot be created, replaced or written.
pub fn write_string_dataset<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    name: &str,
    text: &str,
) -> Result<(), MarshalError> {
    ResourceScope::run(backend, "write_string_dataset", name, |scope| {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        write_replace(
            scope,
            parent,
            name,
            TypeDescriptor::FixedString { size: bytes.len() },
            &Extent::Scalar,
            Payload::Bytes(&bytes),
        )
    })
}

/// Create the scalar fixed-length string dataset `name` from a byte string.
///
/// A null terminator is appended if `bytes` does not end with one.
///
/// # Errors
/// Returns a [`MarshalError`] if `bytes` is empty or the dataset cannot be created or written.
pub fn write_string_dataset_bytes<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    name: &str,
    bytes: &[u8],
) -> Result<(), MarshalError> {
    ResourceScope::run(backend, "write_string_dataset_bytes", name, |scope| {
        if bytes.is_empty() {
            return Err(scope.empty_payload());
        }
        let terminated: Cow<[u8]> = if bytes.ends_with(&[0]) {
            Cow::Borrowed(bytes)
        } else {
            Cow::Owned([bytes, &[0u8][..]].concat())
        };
        write_new(
            scope,
            parent,
            name,
            TypeDescriptor::FixedString {
                size: terminated.len(),
            },
            &Extent::Scalar,
            None,
            Payload::Bytes(&terminated),
        )
    })
}

/// Write `text` to the scalar variable-length string dataset `name`, creating or replacing it.
///
/// # Errors
/// Returns a [`MarshalError`] if the dataset cannot be created, replaced or written.
pub fn write_variable_string_dataset<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    name: &str,
    text: &str,
) -> Result<(), MarshalError> {
    ResourceScope::run(backend, "write_variable_string_dataset", name, |scope| {
        write_replace(
            scope,
            parent,
            name,
            TypeDescriptor::VariableString,
            &Extent::Scalar,
            Payload::Strings(&[text]),
        )
    })
}

/// Create the rank 1 variable-length string dataset `name` holding `texts` in order.
///
/// Each string is written to its own single-element hyperslab.
///
/// # Errors
/// Returns a [`MarshalError`] if `texts` is empty or the dataset cannot be created or written.
pub fn write_string_list_dataset<B: Backend + ?Sized, S: AsRef<str>>(
    backend: &B,
    parent: Handle,
    name: &str,
    texts: &[S],
) -> Result<(), MarshalError> {
    ResourceScope::run(backend, "write_string_list_dataset", name, |scope| {
        if texts.is_empty() {
            return Err(scope.empty_payload());
        }
        let (dataset, datatype) = create_dataset(
            scope,
            parent,
            name,
            TypeDescriptor::VariableString,
            &Extent::Simple(vec![texts.len() as u64]),
            None,
        )?;
        let backend = scope.backend();
        for (index, text) in (0u64..).zip(texts) {
            let file_space = scope.acquire(ResourceKind::Dataspace, backend.dataset_space(dataset))?;
            backend
                .select_hyperslab(file_space, &[index], &[1])
                .map_err(|err| scope.resource_create(ResourceKind::Dataspace, err))?;
            transfer(
                scope,
                dataset,
                datatype,
                Some(file_space),
                Payload::Strings(&[text.as_ref()]),
            )?;
            scope.release(file_space)?;
        }
        Ok(())
    })
}

/// Read all elements of the dataset `name`.
///
/// # Errors
/// Returns a [`MarshalError`] if the dataset cannot be opened or its type is not `T`.
pub fn read_dataset<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    name: &str,
) -> Result<Vec<T>, MarshalError> {
    ResourceScope::run(backend, "read_dataset", name, |scope| {
        read_elements(scope, parent, name, None)
    })
}

/// Read all elements of the dataset `name` into `out`.
///
/// # Errors
/// Returns [`ShapeMismatch`](MarshalError::ShapeMismatch) if the length of `out` is not the number of elements of the dataset,
/// and the other failures of [`read_dataset`].
pub fn read_dataset_into<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    name: &str,
    out: &mut [T],
) -> Result<(), MarshalError> {
    ResourceScope::run(backend, "read_dataset_into", name, |scope| {
        let elements = read_elements(scope, parent, name, Some(out.len()))?;
        out.copy_from_slice(&elements);
        Ok(())
    })
}

/// Read the single element of the dataset `name`.
///
/// # Errors
/// Returns [`ShapeMismatch`](MarshalError::ShapeMismatch) if the dataset does not hold exactly one element,
/// and the other failures of [`read_dataset`].
pub fn read_scalar_dataset<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    name: &str,
) -> Result<T, MarshalError> {
    ResourceScope::run(backend, "read_scalar_dataset", name, |scope| {
        match read_elements::<B, T>(scope, parent, name, Some(1))?.as_slice() {
            [value] => Ok(*value),
            elements => Err(scope.shape_mismatch(format!(
                "read {} elements, expected one",
                elements.len()
            ))),
        }
    })
}

/// Read the string dataset `name`.
///
/// A fixed-length string is read up to its first null byte.
/// A variable-length string dataset must hold at most one string, an empty dataset reads as an empty string.
///
/// # Errors
/// Returns [`ShapeMismatch`](MarshalError::ShapeMismatch) if the dataset is not a string dataset or holds more than one variable-length string,
/// and a [`MarshalError`] if it cannot be opened or read.
pub fn read_string_dataset<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    name: &str,
) -> Result<String, MarshalError> {
    ResourceScope::run(backend, "read_string_dataset", name, |scope| {
        read_string(scope, parent, name)
    })
}

/// Read the string dataset `name` into `out` followed by a null terminator.
///
/// Returns the length of the string, excluding the terminator.
///
/// # Errors
/// Returns [`ShapeMismatch`](MarshalError::ShapeMismatch) if `out` cannot hold the string and its terminator,
/// and the other failures of [`read_string_dataset`].
pub fn read_string_dataset_into<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    name: &str,
    out: &mut [u8],
) -> Result<usize, MarshalError> {
    ResourceScope::run(backend, "read_string_dataset_into", name, |scope| {
        let text = read_string(scope, parent, name)?;
        let length = text.len();
        if out.len() <= length {
            return Err(scope.shape_mismatch(format!(
                "a buffer of {} bytes cannot hold {length} bytes and a terminator",
                out.len()
            )));
        }
        out[..length].copy_from_slice(text.as_bytes());
        out[length] = 0;
        Ok(length)
    })
}

/// Read all strings of the rank 1 variable-length string dataset `name`.
///
/// # Errors
/// Returns [`ShapeMismatch`](MarshalError::ShapeMismatch) if the dataset is not a rank 1 variable-length string dataset,
/// and a [`MarshalError`] if it cannot be opened or read.
pub fn read_string_list_dataset<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    name: &str,
) -> Result<Vec<String>, MarshalError> {
    ResourceScope::run(backend, "read_string_list_dataset", name, |scope| {
        let dataset = open_dataset(scope, parent, name)?;
        let (descriptor, extent) = stored_layout(scope, dataset)?;
        if extent.rank() != 1 {
            return Err(scope.shape_mismatch(format!(
                "the dataset has rank {}, expected 1",
                extent.rank()
            )));
        }
        if !descriptor.is_variable_length() {
            return Err(scope.shape_mismatch(format!(
                "the dataset holds {descriptor} elements, not variable-length strings"
            )));
        }
        read_strings(scope, dataset)
    })
}

/// Returns the number of elements of the dataset `name`.
///
/// # Errors
/// Returns a [`MarshalError`] if the dataset cannot be opened.
pub fn dataset_element_count<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    name: &str,
) -> Result<u64, MarshalError> {
    let (_, extent) = dataset_layout(backend, "dataset_element_count", parent, name)?;
    Ok(extent.num_elements())
}

/// Returns the rank of the dataset `name`.
///
/// A scalar string dataset has rank 1.
///
/// # Errors
/// Returns a [`MarshalError`] if the dataset cannot be opened.
pub fn dataset_rank<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    name: &str,
) -> Result<usize, MarshalError> {
    let (descriptor, extent) = dataset_layout(backend, "dataset_rank", parent, name)?;
    Ok(reported_shape(&descriptor, &extent).len())
}

/// Returns the shape of the dataset `name`.
///
/// A scalar string dataset has the shape `[type size]`.
///
/// # Errors
/// Returns a [`MarshalError`] if the dataset cannot be opened.
pub fn dataset_shape<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    name: &str,
) -> Result<Vec<u64>, MarshalError> {
    let (descriptor, extent) = dataset_layout(backend, "dataset_shape", parent, name)?;
    Ok(reported_shape(&descriptor, &extent))
}

/// Returns the shape, type class and type size of the dataset `name`.
///
/// # Errors
/// Returns a [`MarshalError`] if the dataset cannot be opened.
pub fn dataset_info<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    name: &str,
) -> Result<DatasetInfo, MarshalError> {
    let (descriptor, extent) = dataset_layout(backend, "dataset_info", parent, name)?;
    Ok(DatasetInfo {
        shape: reported_shape(&descriptor, &extent),
        type_class: descriptor.type_class(),
        type_size: descriptor.size(),
    })
}

/// Returns the element type of the dataset `name`.
///
/// # Errors
/// Returns a [`MarshalError`] if the dataset cannot be opened.
pub fn dataset_type<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    name: &str,
) -> Result<TypeDescriptor, MarshalError> {
    let (descriptor, _) = dataset_layout(backend, "dataset_type", parent, name)?;
    Ok(descriptor)
}

/// Returns true if `name` relative to `parent` is a dataset.
///
/// Backend error reporting is suppressed during the probe and any failure reads as false.
pub fn dataset_exists<B: Backend + ?Sized>(backend: &B, parent: Handle, name: &str) -> bool {
    let _lock = critical_section();
    let _suppressed = ErrorReportingSuppressed::new();
    backend.exists_as_dataset(parent, name).unwrap_or(false)
}

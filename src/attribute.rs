//! Attribute marshalling.
//!
//! Attributes are named values attached to a group or dataset, the host object.
//! Every operation takes a `parent` handle, the `object_name` of the host relative to the parent, and the attribute name.
//!
//! A write resolves the kind of the host and opens it, creates the dataspace and datatype,
//! deletes any existing attribute with the same name (attributes cannot be resized or retyped in place),
//! then creates and writes the attribute. All handles are released in reverse order, see [`ResourceScope`].

use std::borrow::Cow;

use crate::{
    backend::{Backend, Extent, Handle},
    config::ErrorReportingSuppressed,
    dataset::{create_space, element_count, element_payload, reported_shape},
    datatype::{Element, TypeClass, TypeDescriptor, UnsupportedTypeError},
    guard::{ResourceKind, ResourceScope},
    sync::critical_section,
    MarshalError,
};

/// The shape, type class and type of an attribute.
///
/// The caller owns [`type_handle`](AttributeInfo::type_handle), an open handle to the attribute datatype.
#[derive(Debug)]
pub struct AttributeInfo<'b, B: Backend + ?Sized> {
    /// The shape. A scalar string attribute has the shape `[type size]`.
    pub shape: Vec<u64>,
    /// The type class.
    pub type_class: TypeClass,
    /// The size in bytes of one element, [`None`] for variable-length strings.
    pub type_size: Option<usize>,
    /// The open attribute datatype.
    pub type_handle: OwnedTypeHandle<'b, B>,
}

/// An open datatype handle owned by the caller.
///
/// The handle is closed on drop, or explicitly with [`close`](OwnedTypeHandle::close).
pub struct OwnedTypeHandle<'b, B: Backend + ?Sized> {
    backend: &'b B,
    handle: Handle,
    descriptor: TypeDescriptor,
    open: bool,
}

impl<B: Backend + ?Sized> std::fmt::Debug for OwnedTypeHandle<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedTypeHandle")
            .field("handle", &self.handle)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl<'b, B: Backend + ?Sized> OwnedTypeHandle<'b, B> {
    /// Returns the datatype handle.
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Returns the datatype descriptor.
    #[must_use]
    pub fn descriptor(&self) -> TypeDescriptor {
        self.descriptor
    }

    /// Close the datatype handle.
    ///
    /// # Errors
    /// Returns [`MarshalError::ResourceClose`] if the backend fails to close the handle.
    pub fn close(mut self) -> Result<(), MarshalError> {
        let _lock = critical_section();
        self.open = false;
        self.backend
            .close_type(self.handle)
            .map_err(|source| MarshalError::ResourceClose {
                target: self.handle.to_string(),
                resource: ResourceKind::Datatype,
                source,
            })
    }
}

impl<B: Backend + ?Sized> Drop for OwnedTypeHandle<'_, B> {
    fn drop(&mut self) {
        if self.open {
            let _lock = critical_section();
            if let Err(err) = self.backend.close_type(self.handle) {
                log::warn!("cannot close datatype {}: {err}", self.handle);
            }
        }
    }
}

fn target(object_name: &str, attribute_name: &str) -> String {
    format!("{object_name}@{attribute_name}")
}

/// Resolve the kind of the host object and open it.
fn open_host<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    parent: Handle,
    object_name: &str,
) -> Result<Handle, MarshalError> {
    let backend = scope.backend();
    let kind = backend
        .object_kind_of(parent, object_name)
        .map_err(|err| scope.object_resolution(err))?;
    scope.acquire_object(kind, backend.open_object(parent, object_name, kind))
}

fn open_attribute<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
) -> Result<Handle, MarshalError> {
    let backend = scope.backend();
    let object = open_host(scope, parent, object_name)?;
    scope.acquire(
        ResourceKind::Attribute,
        backend.open_attribute(object, attribute_name),
    )
}

/// Returns the stored type and extent of an open attribute.
fn stored_layout<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    attribute: Handle,
) -> Result<(TypeDescriptor, Extent), MarshalError> {
    let backend = scope.backend();
    let datatype = scope.acquire(ResourceKind::Datatype, backend.attribute_type(attribute))?;
    let descriptor = backend
        .type_descriptor(datatype)
        .map_err(|err| scope.object_resolution(err))?;
    scope.release(datatype)?;
    let space = scope.acquire(ResourceKind::Dataspace, backend.attribute_space(attribute))?;
    let extent = backend
        .space_extent(space)
        .map_err(|err| scope.object_resolution(err))?;
    scope.release(space)?;
    Ok((descriptor, extent))
}

/// Create (or recreate) an attribute and write `bytes` of `descriptor` elements to it.
fn write_bytes<B: Backend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
    descriptor: TypeDescriptor,
    extent: &Extent,
    bytes: &[u8],
) -> Result<(), MarshalError> {
    let backend = scope.backend();
    let object = open_host(scope, parent, object_name)?;
    let space = create_space(scope, extent)?;
    let datatype = scope.acquire(ResourceKind::Datatype, backend.create_type(descriptor))?;
    let exists = backend
        .attribute_exists(object, attribute_name)
        .map_err(|err| scope.object_resolution(err))?;
    if exists {
        backend
            .delete_attribute(object, attribute_name)
            .map_err(|err| scope.resource_create(ResourceKind::Attribute, err))?;
    }
    let attribute = scope.acquire(
        ResourceKind::Attribute,
        backend.create_attribute(object, attribute_name, datatype, space),
    )?;
    backend
        .write_attribute(attribute, datatype, bytes)
        .map_err(|err| scope.transfer(err))
}

fn read_elements<B: Backend + ?Sized, T: Element>(
    scope: &mut ResourceScope<'_, B>,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
    expected_len: Option<usize>,
) -> Result<Vec<T>, MarshalError> {
    let backend = scope.backend();
    let descriptor = T::type_descriptor().map_err(|err| scope.unsupported_type(err))?;
    let element_size = descriptor
        .size()
        .ok_or_else(|| scope.unsupported_type(UnsupportedTypeError(T::KIND)))?;
    let attribute = open_attribute(scope, parent, object_name, attribute_name)?;
    let (_, extent) = stored_layout(scope, attribute)?;
    let num_elements = element_count(scope, &extent)?;
    if let Some(expected_len) = expected_len {
        if expected_len != num_elements {
            return Err(scope.shape_mismatch(format!(
                "the attribute has {num_elements} elements, expected {expected_len}"
            )));
        }
    }
    let datatype = scope.acquire(ResourceKind::Datatype, backend.create_type(descriptor))?;
    let mut bytes = vec![0; num_elements * element_size];
    backend
        .read_attribute(attribute, datatype, &mut bytes)
        .map_err(|err| scope.transfer(err))?;
    T::from_bytes(&bytes).map_err(|err| scope.transfer(err))
}

/// Write a single value to the attribute `attribute_name` of `object_name`, replacing any existing attribute.
///
/// Scalars are stored with the extent `[1]`.
///
/// # Errors
/// See [`write_attribute`].
pub fn write_scalar_attribute<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
    value: T,
) -> Result<(), MarshalError> {
    write_attribute(
        backend,
        parent,
        object_name,
        attribute_name,
        &[1],
        std::slice::from_ref(&value),
    )
}

/// Write `data` with `shape` to the attribute `attribute_name` of `object_name`, replacing any existing attribute.
///
/// # Errors
/// Returns a [`MarshalError`] if:
///  - `data` is empty ([`NullOrEmptyPayload`](MarshalError::NullOrEmptyPayload)),
///  - the shape does not match the number of elements ([`ShapeMismatch`](MarshalError::ShapeMismatch)),
///  - the host object cannot be resolved ([`ObjectResolution`](MarshalError::ObjectResolution)), or
///  - the attribute cannot be created, written or closed.
pub fn write_attribute<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
    shape: &[u64],
    data: &[T],
) -> Result<(), MarshalError> {
    let target = target(object_name, attribute_name);
    ResourceScope::run(backend, "write_attribute", target, |scope| {
        let descriptor = element_payload(scope, shape, data)?;
        write_bytes(
            scope,
            parent,
            object_name,
            attribute_name,
            descriptor,
            &Extent::Simple(shape.to_vec()),
            &T::to_bytes(data),
        )
    })
}

/// Write `text` to the scalar fixed-length string attribute `attribute_name` of `object_name`, replacing any existing attribute.
///
/// The string type is `text.len() + 1` bytes, including the null terminator.
///
/// # Errors
/// Returns a [`MarshalError`] if the host object cannot be resolved or the attribute cannot be created, written or closed.
pub fn write_string_attribute<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
    text: &str,
) -> Result<(), MarshalError> {
    let target = target(object_name, attribute_name);
    ResourceScope::run(backend, "write_string_attribute", target, |scope| {
        let bytes = [text.as_bytes(), &[0u8][..]].concat();
        write_bytes(
            scope,
            parent,
            object_name,
            attribute_name,
            TypeDescriptor::FixedString { size: bytes.len() },
            &Extent::Scalar,
            &bytes,
        )
    })
}

/// Write a byte string to the scalar fixed-length string attribute `attribute_name` of `object_name`, replacing any existing attribute.
///
/// A null terminator is appended if `bytes` does not end with one.
///
/// # Errors
/// Returns a [`MarshalError`] if `bytes` is empty, and the other failures of [`write_string_attribute`].
pub fn write_string_attribute_bytes<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
    bytes: &[u8],
) -> Result<(), MarshalError> {
    let target = target(object_name, attribute_name);
    ResourceScope::run(backend, "write_string_attribute_bytes", target, |scope| {
        if bytes.is_empty() {
            return Err(scope.empty_payload());
        }
        let terminated: Cow<[u8]> = if bytes.ends_with(&[0]) {
            Cow::Borrowed(bytes)
        } else {
            Cow::Owned([bytes, &[0u8][..]].concat())
        };
        write_bytes(
            scope,
            parent,
            object_name,
            attribute_name,
            TypeDescriptor::FixedString {
                size: terminated.len(),
            },
            &Extent::Scalar,
            &terminated,
        )
    })
}

/// Write each `(name, text)` pair of `attributes` as a string attribute of `object_name`.
///
/// Writing stops at the first failure. Attributes written before the failure are kept.
///
/// # Errors
/// Returns the first failure of [`write_string_attribute`].
pub fn write_string_attributes<B, I, K, V>(
    backend: &B,
    parent: Handle,
    object_name: &str,
    attributes: I,
) -> Result<(), MarshalError>
where
    B: Backend + ?Sized,
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let _lock = critical_section();
    for (attribute_name, text) in attributes {
        write_string_attribute(
            backend,
            parent,
            object_name,
            attribute_name.as_ref(),
            text.as_ref(),
        )?;
    }
    Ok(())
}

/// Read the single element of the attribute `attribute_name` of `object_name`.
///
/// # Errors
/// Returns [`ShapeMismatch`](MarshalError::ShapeMismatch) if the attribute does not hold exactly one element,
/// and the other failures of [`read_attribute`].
pub fn read_scalar_attribute<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
) -> Result<T, MarshalError> {
    let target = target(object_name, attribute_name);
    ResourceScope::run(backend, "read_scalar_attribute", target, |scope| {
        match read_elements::<B, T>(scope, parent, object_name, attribute_name, Some(1))?
            .as_slice()
        {
            [value] => Ok(*value),
            elements => Err(scope.shape_mismatch(format!(
                "read {} elements, expected one",
                elements.len()
            ))),
        }
    })
}

/// Read all elements of the attribute `attribute_name` of `object_name`.
///
/// # Errors
/// Returns a [`MarshalError`] if the host object or attribute cannot be opened or the attribute type is not `T`.
pub fn read_attribute<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
) -> Result<Vec<T>, MarshalError> {
    let target = target(object_name, attribute_name);
    ResourceScope::run(backend, "read_attribute", target, |scope| {
        read_elements(scope, parent, object_name, attribute_name, None)
    })
}

/// Read all elements of the attribute `attribute_name` of `object_name` into `out`.
///
/// # Errors
/// Returns [`ShapeMismatch`](MarshalError::ShapeMismatch) if the length of `out` is not the number of elements of the attribute,
/// and the other failures of [`read_attribute`].
pub fn read_attribute_into<B: Backend + ?Sized, T: Element>(
    backend: &B,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
    out: &mut [T],
) -> Result<(), MarshalError> {
    let target = target(object_name, attribute_name);
    ResourceScope::run(backend, "read_attribute_into", target, |scope| {
        let elements = read_elements(scope, parent, object_name, attribute_name, Some(out.len()))?;
        out.copy_from_slice(&elements);
        Ok(())
    })
}

/// Read the fixed-length string attribute `attribute_name` of `object_name`.
///
/// A single trailing null terminator is removed.
///
/// # Errors
/// Returns [`ShapeMismatch`](MarshalError::ShapeMismatch) if the attribute is not a single fixed-length string.
/// Variable-length string attributes are rejected.
pub fn read_string_attribute<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
) -> Result<String, MarshalError> {
    let target = target(object_name, attribute_name);
    ResourceScope::run(backend, "read_string_attribute", target, |scope| {
        let attribute = open_attribute(scope, parent, object_name, attribute_name)?;
        let (descriptor, extent) = stored_layout(scope, attribute)?;
        let TypeDescriptor::FixedString { size } = descriptor else {
            return Err(scope.shape_mismatch(format!(
                "the attribute holds {descriptor} elements, not a fixed-length string"
            )));
        };
        if extent.num_elements() != 1 {
            return Err(scope.shape_mismatch(format!(
                "the attribute holds {} strings, expected one",
                extent.num_elements()
            )));
        }
        let backend = scope.backend();
        let datatype = scope.acquire(ResourceKind::Datatype, backend.create_type(descriptor))?;
        let mut bytes = vec![0; size];
        backend
            .read_attribute(attribute, datatype, &mut bytes)
            .map_err(|err| scope.transfer(err))?;
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        String::from_utf8(bytes).map_err(|err| scope.transfer(err))
    })
}

/// Returns true if `object_name` has the attribute `attribute_name`.
///
/// Backend error reporting is suppressed during the probe and any failure, such as a missing host object, reads as false.
pub fn attribute_exists<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
) -> bool {
    let _lock = critical_section();
    let _suppressed = ErrorReportingSuppressed::new();
    let target = target(object_name, attribute_name);
    ResourceScope::run(backend, "attribute_exists", target, |scope| {
        let object = open_host(scope, parent, object_name)?;
        backend
            .attribute_exists(object, attribute_name)
            .map_err(|err| scope.object_resolution(err))
    })
    .unwrap_or(false)
}

/// Returns the rank of the attribute `attribute_name` of `object_name`.
///
/// A scalar string attribute has rank 1.
///
/// # Errors
/// Returns a [`MarshalError`] if the host object or attribute cannot be opened.
pub fn attribute_rank<B: Backend + ?Sized>(
    backend: &B,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
) -> Result<usize, MarshalError> {
    let target = target(object_name, attribute_name);
    ResourceScope::run(backend, "attribute_rank", target, |scope| {
        let attribute = open_attribute(scope, parent, object_name, attribute_name)?;
        let (descriptor, extent) = stored_layout(scope, attribute)?;
        Ok(reported_shape(&descriptor, &extent).len())
    })
}

/// Returns the shape, type class and an open datatype of the attribute `attribute_name` of `object_name`.
///
/// The returned [`OwnedTypeHandle`] is closed when it is dropped.
///
/// # Errors
/// Returns a [`MarshalError`] if the host object or attribute cannot be opened.
pub fn attribute_info<'b, B: Backend + ?Sized>(
    backend: &'b B,
    parent: Handle,
    object_name: &str,
    attribute_name: &str,
) -> Result<AttributeInfo<'b, B>, MarshalError> {
    let target = target(object_name, attribute_name);
    ResourceScope::run(backend, "attribute_info", target, |scope| {
        let attribute = open_attribute(scope, parent, object_name, attribute_name)?;
        let (_, extent) = stored_layout(scope, attribute)?;
        let handle = scope.acquire(ResourceKind::Datatype, backend.attribute_type(attribute))?;
        let descriptor = backend
            .type_descriptor(handle)
            .map_err(|err| scope.object_resolution(err))?;
        scope.detach(handle);
        Ok(AttributeInfo {
            shape: reported_shape(&descriptor, &extent),
            type_class: descriptor.type_class(),
            type_size: descriptor.size(),
            type_handle: OwnedTypeHandle {
                backend,
                handle,
                descriptor,
                open: true,
            },
        })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{backend::StoreBackend, storage::store::MemoryStore};

    #[test]
    fn attribute_write_read() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let root = backend.open_root().unwrap();
        write_scalar_attribute(&backend, root, ".", "answer", 42u32).unwrap();
        assert_eq!(
            read_scalar_attribute::<_, u32>(&backend, root, ".", "answer").unwrap(),
            42
        );
        write_attribute(&backend, root, ".", "grid", &[2, 2], &[1i16, 2, 3, 4]).unwrap();
        let mut out = [0i16; 4];
        read_attribute_into(&backend, root, ".", "grid", &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(attribute_rank(&backend, root, ".", "grid").unwrap(), 2);
        assert!(matches!(
            read_attribute_into(&backend, root, ".", "grid", &mut [0i16; 3]),
            Err(MarshalError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            read_string_attribute(&backend, root, ".", "grid"),
            Err(MarshalError::ShapeMismatch { .. })
        ));
        assert_eq!(backend.open_handle_count(), 1);
    }

    #[test]
    fn attribute_host_missing() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let root = backend.open_root().unwrap();
        assert!(matches!(
            write_string_attribute(&backend, root, "missing", "a", "b"),
            Err(MarshalError::ObjectResolution { .. })
        ));
        assert!(!attribute_exists(&backend, root, "missing", "a"));
        assert_eq!(backend.open_handle_count(), 1);
    }

    #[test]
    fn attribute_string_bytes() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let root = backend.open_root().unwrap();
        write_string_attribute_bytes(&backend, root, ".", "units", b"mm\0").unwrap();
        assert_eq!(
            read_string_attribute(&backend, root, ".", "units").unwrap(),
            "mm"
        );
        write_string_attribute(&backend, root, ".", "empty", "").unwrap();
        assert_eq!(
            read_string_attribute(&backend, root, ".", "empty").unwrap(),
            ""
        );
        assert!(matches!(
            write_string_attribute_bytes(&backend, root, ".", "units", b""),
            Err(MarshalError::NullOrEmptyPayload { .. })
        ));
    }
}

//! Scoped acquisition and release of backend sub-resources.
//!
//! A marshalling operation runs inside [`ResourceScope::run`], which enters the [critical section](crate::sync::critical_section),
//! records every handle acquired by the operation and releases them in reverse order when the operation ends, whatever its outcome.
//!
//! Failures follow a first-failure-wins policy ([`OperationStatus`]): the first failure of the operation is returned,
//! and any failure after it (typically while closing) is logged with [`log::warn!`].

use derive_more::Display;

use crate::{
    backend::{Backend, BackendError, Handle, ObjectKind},
    datatype::UnsupportedTypeError,
    error::TransferError,
    sync::critical_section,
    MarshalError,
};

/// The kind of a backend sub-resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum ResourceKind {
    /// A dataspace.
    #[display("dataspace")]
    Dataspace,
    /// A datatype.
    #[display("datatype")]
    Datatype,
    /// A dataset creation property list.
    #[display("dataset creation property list")]
    DatasetProperties,
    /// A group or dataset.
    #[display("{_0}")]
    Object(ObjectKind),
    /// An attribute.
    #[display("attribute")]
    Attribute,
    /// A variable-length string buffer.
    #[display("string buffer")]
    VlenBuffer,
}

impl ResourceKind {
    fn close<B: Backend + ?Sized>(self, backend: &B, handle: Handle) -> Result<(), BackendError> {
        match self {
            Self::Dataspace => backend.close_space(handle),
            Self::Datatype => backend.close_type(handle),
            Self::DatasetProperties => backend.close_properties(handle),
            Self::Object(kind) => backend.close_object(handle, kind),
            Self::Attribute => backend.close_attribute(handle),
            Self::VlenBuffer => backend.reclaim_vlen_buffer(handle),
        }
    }
}

/// The status of an operation: the first recorded failure, and a count of later (secondary) failures.
#[derive(Debug, Default)]
pub struct OperationStatus {
    primary: Option<MarshalError>,
    secondary: usize,
}

impl OperationStatus {
    /// Record a failure.
    ///
    /// The first failure becomes the primary failure, later failures are logged and counted.
    pub fn record(&mut self, error: MarshalError) {
        if self.primary.is_none() {
            self.primary = Some(error);
        } else {
            log::warn!("secondary failure: {error}");
            self.secondary += 1;
        }
    }

    /// Returns true if no failure has been recorded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.primary.is_none()
    }

    /// Returns the primary failure.
    #[must_use]
    pub fn primary(&self) -> Option<&MarshalError> {
        self.primary.as_ref()
    }

    /// Returns the number of secondary failures.
    #[must_use]
    pub fn secondary_count(&self) -> usize {
        self.secondary
    }

    /// Combine the outcome of an operation with the failures recorded after it.
    ///
    /// A failed `result` is returned as is and any recorded failure is logged as secondary.
    /// Otherwise the primary recorded failure, if any, is returned.
    ///
    /// # Errors
    /// Returns the failure of `result` or the primary recorded failure.
    pub fn merge<T>(self, result: Result<T, MarshalError>) -> Result<T, MarshalError> {
        match (result, self.primary) {
            (Err(error), Some(later)) => {
                log::warn!("secondary failure: {later}");
                Err(error)
            }
            (Err(error), None) | (Ok(_), Some(error)) => Err(error),
            (Ok(value), None) => Ok(value),
        }
    }
}

/// The sub-resources acquired by one marshalling operation.
///
/// Handles are released in reverse acquisition order by [`finish`](ResourceScope::finish), or on drop.
pub struct ResourceScope<'b, B: Backend + ?Sized> {
    backend: &'b B,
    operation: &'static str,
    target: String,
    acquired: Vec<(ResourceKind, Handle)>,
}

impl<'b, B: Backend + ?Sized> ResourceScope<'b, B> {
    /// Create a new scope for `operation` on `target`.
    #[must_use]
    pub fn new(backend: &'b B, operation: &'static str, target: impl Into<String>) -> Self {
        Self {
            backend,
            operation,
            target: target.into(),
            acquired: Vec::new(),
        }
    }

    /// Run `f` in a new scope inside the critical section, then [`finish`](ResourceScope::finish) the scope.
    ///
    /// # Errors
    /// Returns the first failure of `f` or of releasing its resources.
    pub fn run<T>(
        backend: &'b B,
        operation: &'static str,
        target: impl Into<String>,
        f: impl FnOnce(&mut Self) -> Result<T, MarshalError>,
    ) -> Result<T, MarshalError> {
        let _lock = critical_section();
        let mut scope = Self::new(backend, operation, target);
        log::trace!("{} {}", scope.operation, scope.target);
        let result = f(&mut scope);
        scope.finish(result)
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &'b B {
        self.backend
    }

    /// Returns the operation target.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Track the handle created by `result`.
    ///
    /// # Errors
    /// Returns [`MarshalError::ResourceCreate`] if `result` is a failure.
    pub fn acquire(
        &mut self,
        kind: ResourceKind,
        result: Result<Handle, BackendError>,
    ) -> Result<Handle, MarshalError> {
        match result {
            Ok(handle) => Ok(self.track(kind, handle)),
            Err(source) => Err(self.resource_create(kind, source)),
        }
    }

    /// Track the object handle opened by `result`.
    ///
    /// # Errors
    /// Returns [`MarshalError::ObjectResolution`] if `result` is a failure.
    pub fn acquire_object(
        &mut self,
        kind: ObjectKind,
        result: Result<Handle, BackendError>,
    ) -> Result<Handle, MarshalError> {
        result
            .map(|handle| self.track(ResourceKind::Object(kind), handle))
            .map_err(|source| self.object_resolution(source))
    }

    /// Track an open `handle` of `kind`.
    pub fn track(&mut self, kind: ResourceKind, handle: Handle) -> Handle {
        self.acquired.push((kind, handle));
        handle
    }

    /// Release `handle` now rather than at the end of the scope.
    ///
    /// Does nothing if the handle is not tracked.
    ///
    /// # Errors
    /// Returns [`MarshalError::ResourceClose`] if closing fails. The handle is no longer tracked either way.
    pub fn release(&mut self, handle: Handle) -> Result<(), MarshalError> {
        match self.detach(handle) {
            Some(kind) => kind
                .close(self.backend, handle)
                .map_err(|source| self.close_error(kind, source)),
            None => Ok(()),
        }
    }

    /// Stop tracking `handle` without closing it. Ownership passes to the caller.
    pub fn detach(&mut self, handle: Handle) -> Option<ResourceKind> {
        let index = self.acquired.iter().rposition(|(_, h)| *h == handle)?;
        Some(self.acquired.remove(index).0)
    }

    /// Release all tracked handles in reverse acquisition order and combine their failures with `result`.
    ///
    /// # Errors
    /// Returns the failure of `result`, or the first failure to release a handle.
    pub fn finish<T>(mut self, result: Result<T, MarshalError>) -> Result<T, MarshalError> {
        let mut status = OperationStatus::default();
        self.release_all(&mut status);
        let result = status.merge(result);
        match &result {
            Ok(_) => log::trace!("{} {}: done", self.operation, self.target),
            Err(err) => log::trace!("{} {}: failed ({})", self.operation, self.target, err.status_code()),
        }
        result
    }

    fn release_all(&mut self, status: &mut OperationStatus) {
        while let Some((kind, handle)) = self.acquired.pop() {
            if let Err(source) = kind.close(self.backend, handle) {
                status.record(self.close_error(kind, source));
            }
        }
    }

    fn close_error(&self, resource: ResourceKind, source: BackendError) -> MarshalError {
        MarshalError::ResourceClose {
            target: self.target.clone(),
            resource,
            source,
        }
    }

    /// A [`MarshalError::ResourceCreate`] for this scope, e.g. for a property list that cannot be configured.
    #[must_use]
    pub fn resource_create(&self, resource: ResourceKind, source: BackendError) -> MarshalError {
        MarshalError::ResourceCreate {
            target: self.target.clone(),
            resource,
            source,
        }
    }

    /// A [`MarshalError::ObjectResolution`] for this scope.
    #[must_use]
    pub fn object_resolution(&self, source: BackendError) -> MarshalError {
        MarshalError::ObjectResolution {
            target: self.target.clone(),
            source,
        }
    }

    /// A [`MarshalError::Transfer`] for this scope.
    #[must_use]
    pub fn transfer(&self, source: impl Into<TransferError>) -> MarshalError {
        MarshalError::Transfer {
            target: self.target.clone(),
            source: source.into(),
        }
    }

    /// A [`MarshalError::ShapeMismatch`] for this scope.
    #[must_use]
    pub fn shape_mismatch(&self, reason: impl Into<String>) -> MarshalError {
        MarshalError::ShapeMismatch {
            target: self.target.clone(),
            reason: reason.into(),
        }
    }

    /// A [`MarshalError::NullOrEmptyPayload`] for this scope.
    #[must_use]
    pub fn empty_payload(&self) -> MarshalError {
        MarshalError::NullOrEmptyPayload {
            target: self.target.clone(),
        }
    }

    /// A [`MarshalError::UnsupportedType`] for this scope.
    #[must_use]
    pub fn unsupported_type(&self, source: UnsupportedTypeError) -> MarshalError {
        MarshalError::UnsupportedType {
            target: self.target.clone(),
            source,
        }
    }
}

impl<B: Backend + ?Sized> Drop for ResourceScope<'_, B> {
    fn drop(&mut self) {
        let mut status = OperationStatus::default();
        self.release_all(&mut status);
        if let Some(error) = status.primary() {
            log::warn!("{} {}: {error}", self.operation, self.target);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        backend::{BackendOp, StoreBackend},
        storage::store::MemoryStore,
    };

    #[test]
    fn resource_scope_releases_in_reverse() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let result = ResourceScope::run(&backend, "test", "/", |scope| {
            let backend = scope.backend();
            scope.acquire(ResourceKind::Dataspace, backend.create_scalar_space())?;
            scope.acquire(ResourceKind::DatasetProperties, backend.create_dataset_properties())?;
            assert_eq!(backend.open_handle_count(), 2);
            Ok(7)
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(backend.open_handle_count(), 0);
    }

    #[test]
    fn resource_scope_first_failure_wins() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        backend.inject_fault(BackendOp::CloseSpace);
        let result: Result<(), _> = ResourceScope::run(&backend, "test", "/", |scope| {
            let backend = scope.backend();
            scope.acquire(ResourceKind::Dataspace, backend.create_scalar_space())?;
            Err(scope.shape_mismatch("mismatch"))
        });
        assert!(matches!(result, Err(MarshalError::ShapeMismatch { .. })));

        // without a primary failure the close failure is reported
        let result = ResourceScope::run(&backend, "test", "/", |scope| {
            let backend = scope.backend();
            scope.acquire(ResourceKind::Dataspace, backend.create_scalar_space())?;
            scope.acquire(ResourceKind::Dataspace, backend.create_scalar_space())?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(MarshalError::ResourceClose {
                resource: ResourceKind::Dataspace,
                ..
            })
        ));
        assert_eq!(backend.open_handle_count(), 0);
    }

    #[test]
    fn resource_scope_acquire_failure() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let result = ResourceScope::run(&backend, "test", "/", |scope| {
            let backend = scope.backend();
            scope.acquire(ResourceKind::Dataspace, backend.create_simple_space(&[]))
        });
        assert_eq!(result.unwrap_err().status_code(), -4);
    }

    #[test]
    fn resource_scope_release_and_detach() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let detached = ResourceScope::run(&backend, "test", "/", |scope| {
            let backend = scope.backend();
            let space = scope.acquire(ResourceKind::Dataspace, backend.create_scalar_space())?;
            scope.release(space)?;
            assert_eq!(backend.open_handle_count(), 0);
            let datatype = scope.acquire(
                ResourceKind::Datatype,
                backend.create_type(crate::datatype::TypeDescriptor::VariableString),
            )?;
            assert_eq!(scope.detach(datatype), Some(ResourceKind::Datatype));
            Ok(datatype)
        })
        .unwrap();
        assert_eq!(backend.open_handle_count(), 1);
        backend.close_type(detached).unwrap();
    }

    #[test]
    fn operation_status() {
        let mut status = OperationStatus::default();
        assert!(status.is_ok());
        for reason in ["first", "second", "third"] {
            status.record(MarshalError::ShapeMismatch {
                target: "/".to_string(),
                reason: reason.to_string(),
            });
        }
        assert_eq!(status.secondary_count(), 2);
        assert_eq!(status.primary().unwrap().to_string(), "/: first");
        let result = status.merge(Ok(()));
        assert_eq!(result.unwrap_err().to_string(), "/: first");
    }
}

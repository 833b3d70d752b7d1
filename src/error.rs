use std::string::FromUtf8Error;

use thiserror::Error;

use crate::{
    backend::BackendError,
    datatype::{InvalidElementBytesError, UnsupportedTypeError},
    guard::ResourceKind,
};

/// A dataset or attribute marshalling error.
///
/// Every variant names the `target` of the failing operation (e.g. `/group/dataset` or `/group/dataset@attribute`).
#[derive(Debug, Error)]
pub enum MarshalError {
    /// The element kind has no storage type tag.
    #[error("{target}: {source}")]
    UnsupportedType {
        /// The operation target.
        target: String,
        /// The unsupported kind.
        source: UnsupportedTypeError,
    },
    /// A write was requested with an empty payload.
    #[error("{target}: the payload is empty")]
    NullOrEmptyPayload {
        /// The operation target.
        target: String,
    },
    /// The named object or its kind could not be resolved.
    #[error("{target}: cannot resolve object: {source}")]
    ObjectResolution {
        /// The operation target.
        target: String,
        /// The backend failure.
        source: BackendError,
    },
    /// A sub-resource could not be created or opened.
    #[error("{target}: cannot create {resource}: {source}")]
    ResourceCreate {
        /// The operation target.
        target: String,
        /// The resource that could not be created.
        resource: ResourceKind,
        /// The backend failure.
        source: BackendError,
    },
    /// A read or write failed after all resources were valid.
    #[error("{target}: transfer failed: {source}")]
    Transfer {
        /// The operation target.
        target: String,
        /// The transfer failure.
        source: TransferError,
    },
    /// A sub-resource could not be closed.
    #[error("{target}: cannot close {resource}: {source}")]
    ResourceClose {
        /// The operation target.
        target: String,
        /// The resource that could not be closed.
        resource: ResourceKind,
        /// The backend failure.
        source: BackendError,
    },
    /// The stored extent or type does not match what the caller expects.
    #[error("{target}: {reason}")]
    ShapeMismatch {
        /// The operation target.
        target: String,
        /// A description of the mismatch.
        reason: String,
    },
}

/// The cause of a [`MarshalError::Transfer`].
#[derive(Debug, Error)]
pub enum TransferError {
    /// The backend read or write call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The transferred bytes are not valid elements.
    #[error(transparent)]
    Element(#[from] InvalidElementBytesError),
    /// A transferred string is not valid UTF-8.
    #[error(transparent)]
    Utf8(#[from] FromUtf8Error),
}

impl MarshalError {
    /// Returns the negative status code of the error kind.
    ///
    /// | Kind | Code |
    /// |---|---|
    /// | [`UnsupportedType`](Self::UnsupportedType) | -1 |
    /// | [`NullOrEmptyPayload`](Self::NullOrEmptyPayload) | -2 |
    /// | [`ObjectResolution`](Self::ObjectResolution) | -3 |
    /// | [`ResourceCreate`](Self::ResourceCreate) | -4 |
    /// | [`Transfer`](Self::Transfer) | -5 |
    /// | [`ResourceClose`](Self::ResourceClose) | -6 |
    /// | [`ShapeMismatch`](Self::ShapeMismatch) | -7 |
    #[must_use]
    pub const fn status_code(&self) -> i32 {
        match self {
            Self::UnsupportedType { .. } => -1,
            Self::NullOrEmptyPayload { .. } => -2,
            Self::ObjectResolution { .. } => -3,
            Self::ResourceCreate { .. } => -4,
            Self::Transfer { .. } => -5,
            Self::ResourceClose { .. } => -6,
            Self::ShapeMismatch { .. } => -7,
        }
    }

    /// Returns the target of the failing operation.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::UnsupportedType { target, .. }
            | Self::NullOrEmptyPayload { target }
            | Self::ObjectResolution { target, .. }
            | Self::ResourceCreate { target, .. }
            | Self::Transfer { target, .. }
            | Self::ResourceClose { target, .. }
            | Self::ShapeMismatch { target, .. } => target,
        }
    }
}

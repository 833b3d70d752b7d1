//! Typed dataset and attribute marshalling over a handle-based hierarchical scientific data store.
//!
//! `h5marshal` moves in-memory values (numeric arrays, scalars, fixed and variable-length strings) into and out of
//! named datasets and attributes of a hierarchical store, through the narrow handle-based [`Backend`](backend::Backend) interface.
//!
//! Every operation:
//!  - resolves the storage type of the element type from its kind and width ([`datatype`]),
//!  - runs inside the process-wide [critical section](sync::critical_section),
//!  - releases every handle it acquires in reverse order on every exit path ([`guard`]), and
//!  - reports the first failure as a [`MarshalError`], logging any later cleanup failures.
//!
//! ## Getting Started
//! - [`dataset`] and [`attribute`] hold the marshalling operations.
//! - [`backend::StoreBackend`] implements [`Backend`](backend::Backend) over any [store](storage::store), such as
//!   [`MemoryStore`](storage::store::MemoryStore) or [`FilesystemStore`](storage::store::FilesystemStore).
//! - [`config`] holds the global configuration, such as the compression level and the replace policy.
//!
//! ## Example
//! ```
//! # use std::sync::Arc;
//! use h5marshal::{attribute, backend::StoreBackend, dataset, storage::store::MemoryStore};
//!
//! let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
//! let root = backend.open_root()?;
//!
//! let data: Vec<f64> = (0..12).map(f64::from).collect();
//! dataset::write_dataset_compressed(&backend, root, "data", &[4, 3], &data, &[2, 3], 6)?;
//! attribute::write_string_attribute(&backend, root, "data", "units", "m/s")?;
//!
//! assert_eq!(dataset::read_dataset::<_, f64>(&backend, root, "data")?, data);
//! assert_eq!(attribute::read_string_attribute(&backend, root, "data", "units")?, "m/s");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Logging
//! Diagnostics go through the [`log`] facade.
//! Backend failures are logged at the error level unless [suppressed](config::ErrorReportingSuppressed), and
//! secondary cleanup failures are logged at the warn level.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]

pub mod attribute;
pub mod backend;
pub mod chunking;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod datatype;
pub mod guard;
pub mod node;
pub mod storage;
pub mod sync;

mod error;

pub use error::{MarshalError, TransferError};

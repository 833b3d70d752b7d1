//! Storage adapters.
//!
//! An adapter wraps another store and forwards every request to it.

pub mod usage_log;

pub use usage_log::UsageLogStorageAdapter;

//! Global configuration options.

use std::sync::OnceLock;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::codec::CompressionLevel;

/// Global configuration options for the h5marshal crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// ## Report Backend Errors
///  > default: [`true`]
///
/// If enabled, a [`StoreBackend`](crate::backend::StoreBackend) logs every failing backend call with [`log::error!`].
/// Failures are always returned to the caller regardless of this option.
/// Existence probes disable reporting for their duration with [`ErrorReportingSuppressed`].
///
/// ## Compression Level
///  > default: `6`
///
/// The deflate level used by [`write_dataset_compressed_auto`](crate::dataset::write_dataset_compressed_auto).
///
/// ## Replace Policy
///  > default: [`ReplacePolicy::Recreate`]
///
/// How replace operations (e.g. [`replace_dataset`](crate::dataset::replace_dataset)) treat an existing dataset whose extent or type differs from the new payload.
#[derive(Debug, Clone)]
pub struct Config {
    report_backend_errors: bool,
    compression_level: CompressionLevel,
    replace_policy: ReplacePolicy,
}

/// The policy for replacing an existing dataset with a payload of a different extent or type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacePolicy {
    /// Unlink the existing dataset and create a new one.
    #[default]
    Recreate,
    /// Fail with [`MarshalError::ShapeMismatch`](crate::MarshalError::ShapeMismatch).
    Reject,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            report_backend_errors: true,
            compression_level: CompressionLevel::DEFAULT,
            replace_policy: ReplacePolicy::default(),
        }
    }
}

impl Config {
    /// Get the [report backend errors](#report-backend-errors) configuration.
    #[must_use]
    pub fn report_backend_errors(&self) -> bool {
        self.report_backend_errors
    }

    /// Set the [report backend errors](#report-backend-errors) configuration.
    pub fn set_report_backend_errors(&mut self, report_backend_errors: bool) {
        self.report_backend_errors = report_backend_errors;
    }

    /// Get the [compression level](#compression-level) configuration.
    #[must_use]
    pub fn compression_level(&self) -> CompressionLevel {
        self.compression_level
    }

    /// Set the [compression level](#compression-level) configuration.
    pub fn set_compression_level(&mut self, compression_level: CompressionLevel) {
        self.compression_level = compression_level;
    }

    /// Get the [replace policy](#replace-policy) configuration.
    #[must_use]
    pub fn replace_policy(&self) -> ReplacePolicy {
        self.replace_policy
    }

    /// Set the [replace policy](#replace-policy) configuration.
    pub fn set_replace_policy(&mut self, replace_policy: ReplacePolicy) {
        self.replace_policy = replace_policy;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global h5marshal configuration.
///
/// This might deadlock if the global config is already held mutably by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).read()
}

/// Returns a mutable reference to the global h5marshal configuration.
///
/// This might deadlock if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).write()
}

/// Disables [backend error reporting](Config#report-backend-errors) until dropped.
///
/// The previous setting is restored on drop, so guards can be nested.
#[must_use = "reporting is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ErrorReportingSuppressed {
    previous: bool,
}

impl ErrorReportingSuppressed {
    /// Suppress backend error reporting.
    pub fn new() -> Self {
        let mut config = global_config_mut();
        let previous = config.report_backend_errors();
        config.set_report_backend_errors(false);
        Self { previous }
    }
}

impl Default for ErrorReportingSuppressed {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ErrorReportingSuppressed {
    fn drop(&mut self) {
        global_config_mut().set_report_backend_errors(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_report_backend_errors() {
        assert!(Config::default().report_backend_errors());
        let mut config = Config::default();
        config.set_report_backend_errors(false);
        assert!(!config.report_backend_errors());
    }

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.compression_level().as_u32(), 6);
        assert_eq!(config.replace_policy(), ReplacePolicy::Recreate);
    }

    #[test]
    fn error_reporting_suppressed_nests() {
        let initial = global_config().report_backend_errors();
        {
            let _outer = ErrorReportingSuppressed::new();
            assert!(!global_config().report_backend_errors());
            {
                let _inner = ErrorReportingSuppressed::new();
                assert!(!global_config().report_backend_errors());
            }
            assert!(!global_config().report_backend_errors());
        }
        assert_eq!(global_config().report_backend_errors(), initial);
    }
}

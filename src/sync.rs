//! The process-wide critical section.
//!
//! The backing store of a hierarchy is not safe to use concurrently through handles that may share state,
//! so every public marshalling operation runs inside [`critical_section`].

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

static CRITICAL_SECTION: ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());

/// Enter the process-wide critical section.
///
/// The section is left when the returned guard is dropped.
/// It is reentrant, so an operation may call other public operations while holding it.
pub fn critical_section() -> ReentrantMutexGuard<'static, ()> {
    CRITICAL_SECTION.lock()
}

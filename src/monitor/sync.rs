//! Poison-tolerant lock helpers and collector-call isolation
//!
//! Collector and checker callbacks run under `catch_unwind`, so a lock can
//! only be poisoned by a bug in this crate. The guarded data stays consistent
//! in that case and is used as is.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

#[inline]
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn read<T: ?Sized>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn write<T: ?Sized>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Run one collector callback, containing a panic to that collector
///
/// Returns None if the callback panicked.
pub(crate) fn isolate<R>(collector: &str, operation: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(collector = %collector, operation, "Collector callback panicked; skipping it");
            None
        }
    }
}

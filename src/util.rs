//! Small internal helpers.

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
/// The protected structures stay valid across panics, so continuing is safe.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

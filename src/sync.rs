#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering},
    };
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use std::sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering},
    };
}

pub(crate) use imp::*;

use std::sync::PoisonError;

/// Lock a mutex, ignoring poisoning.
///
/// Jobs never run while one of the crate's locks is held, so a poisoned lock
/// can only come from a panic between two plain data-structure operations and
/// the protected state is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Internal utilities for resilient-ops
//!
//! The retry and circuit-breaker primitives live here and are re-exported
//! through `lib.rs` as `resilient_ops::retry` and
//! `resilient_ops::circuit_breaker`.

pub mod circuit_breaker;
pub mod retry;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

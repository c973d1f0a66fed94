// SPDX-License-Identifier: Apache-2.0

//! A non-blocking reader/writer lock.
//!
//! Unlike `std::sync::RwLock`, contention never parks the calling thread: a
//! failed acquisition returns [`Error::Conflicting`] so the owning
//! transaction can roll back and retry instead of blocking a worker thread on
//! another transaction's progress. State lives in a single atomic word so
//! every transition is a single compare-exchange.

use crate::error::Error;
use std::sync::atomic::{AtomicIsize, Ordering};

const UNLOCKED: isize = 0;
const WRITER: isize = -1;

/// Reader/writer lock with at-most-one-writer, many-readers semantics.
///
/// The state word is `0` when unlocked, `-1` when write-locked, and `n > 0`
/// when read-locked by `n` readers.
#[derive(Debug, Default)]
pub struct RwLock {
    state: AtomicIsize,
}

impl RwLock {
    pub const fn new() -> Self {
        RwLock {
            state: AtomicIsize::new(UNLOCKED),
        }
    }

    /// Acquires a read lock. Fails with a conflict if a writer holds the lock.
    pub fn try_rdlock(&self) -> Result<(), Error> {
        loop {
            let cur = self.state.load(Ordering::Acquire);
            if cur == WRITER {
                return Err(Error::conflicting(None));
            }
            let next = cur + 1;
            if self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Acquires a write lock. With `upgrade = true`, the caller asserts it
    /// already holds the sole read lock and wants to promote it in place;
    /// the call fails with a conflict if any other reader is present. With
    /// `upgrade = false`, the call fails unless the lock is fully unlocked.
    pub fn try_wrlock(&self, upgrade: bool) -> Result<(), Error> {
        let expected = if upgrade { 1 } else { UNLOCKED };
        self.state
            .compare_exchange(expected, WRITER, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::conflicting(None))
    }

    /// Releases a previously-acquired read lock.
    pub fn unlock_rd(&self) {
        let prev = self.state.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unlock_rd called without a held read lock");
    }

    /// Releases a previously-acquired write lock.
    pub fn unlock_wr(&self) {
        let prev = self.state.swap(UNLOCKED, Ordering::AcqRel);
        debug_assert_eq!(prev, WRITER, "unlock_wr called without a held write lock");
    }

    pub fn is_unlocked(&self) -> bool {
        self.state.load(Ordering::Acquire) == UNLOCKED
    }
}

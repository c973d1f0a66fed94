// SPDX-License-Identifier: Apache-2.0

//! A reference-counted object whose first acquisition and last release run a
//! user-supplied setup/teardown callback under an internal spin lock.
//! Grounded on `picotm-lib-shared-ref-obj`: the fast path (no callbacks
//! registered) is a single atomic increment/decrement; the slow path takes
//! the spin lock, runs an optional veto condition, and fires `first_ref`/
//! `final_ref` exactly on the 0→1 / 1→0 transition.

use crate::error::Error;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

const MAX_SPIN_UNITS: u32 = 7;

/// Busy-wait helper with exponential back-off, used to bound the spin lock's
/// retry cost instead of looping at full speed under contention.
#[derive(Debug, Default)]
struct BusyBreaker {
    unit: std::sync::atomic::AtomicU32,
}

impl BusyBreaker {
    fn spin(&self) {
        let unit = self.unit.load(Ordering::Acquire).min(MAX_SPIN_UNITS);
        for _ in 0..(1u32 << unit) {
            std::hint::spin_loop();
        }
        self.unit.store((unit + 1).min(MAX_SPIN_UNITS), Ordering::Release);
    }

    fn reset(&self) {
        self.unit.store(0, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    fn lock(&self) {
        let breaker = BusyBreaker::default();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            breaker.spin();
        }
        breaker.reset();
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// A 16-bit saturating-checked reference counter with first-ref/final-ref
/// hooks. `T` is the condition/callback closures' shared context type.
#[derive(Debug, Default)]
pub struct SharedRef {
    count: AtomicU16,
    spin: SpinLock,
}

impl SharedRef {
    pub fn new() -> Self {
        SharedRef {
            count: AtomicU16::new(0),
            spin: SpinLock::default(),
        }
    }

    pub fn count(&self) -> u16 {
        self.count.load(Ordering::Acquire)
    }

    /// Increments the reference count. `cond`, if present, may veto the
    /// increment by returning `false` (no state changes in that case).
    /// `first_ref` runs once, under the lock, exactly on the 0→1
    /// transition; if it returns an error the increment is rolled back.
    pub fn up(
        &self,
        cond: Option<&dyn Fn() -> bool>,
        first_ref: Option<&dyn Fn() -> Result<(), Error>>,
    ) -> Result<(), Error> {
        if cond.is_none() && first_ref.is_none() {
            self.count.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }

        self.spin.lock();
        let result = (|| {
            if let Some(cond) = cond {
                if !cond() {
                    return Ok(());
                }
            }
            let prev = self.count.fetch_add(1, Ordering::AcqRel);
            if prev == 0 {
                if let Some(first_ref) = first_ref {
                    if let Err(err) = first_ref() {
                        self.count.fetch_sub(1, Ordering::AcqRel);
                        return Err(err);
                    }
                }
            }
            Ok(())
        })();
        self.spin.unlock();
        result
    }

    /// Decrements the reference count. `final_ref` runs once, under the
    /// lock, exactly on the 1→0 transition. A failing `final_ref`
    /// indicates the teardown could not be completed and is surfaced marked
    /// non-recoverable: the object's state can no longer be trusted.
    pub fn down(
        &self,
        cond: Option<&dyn Fn() -> bool>,
        final_ref: Option<&dyn Fn() -> Result<(), Error>>,
    ) -> Result<(), Error> {
        if cond.is_none() && final_ref.is_none() {
            self.count.fetch_sub(1, Ordering::AcqRel);
            return Ok(());
        }

        self.spin.lock();
        let result = (|| {
            if let Some(cond) = cond {
                if !cond() {
                    return Ok(());
                }
            }
            let prev = self.count.fetch_sub(1, Ordering::AcqRel);
            if prev == 1 {
                if let Some(final_ref) = final_ref {
                    if let Err(err) = final_ref() {
                        return Err(err.mark_as_non_recoverable());
                    }
                }
            }
            Ok(())
        })();
        self.spin.unlock();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fast_path_increments_and_decrements() {
        let r = SharedRef::new();
        r.up(None, None).unwrap();
        r.up(None, None).unwrap();
        assert_eq!(r.count(), 2);
        r.down(None, None).unwrap();
        assert_eq!(r.count(), 1);
    }

    #[test]
    fn first_ref_fires_once() {
        let r = SharedRef::new();
        let fires = AtomicUsize::new(0);
        let first = || {
            fires.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        r.up(None, Some(&first)).unwrap();
        r.up(None, Some(&first)).unwrap();
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn final_ref_fires_on_last_release() {
        let r = SharedRef::new();
        let fires = AtomicUsize::new(0);
        let last = || {
            fires.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        r.up(None, None).unwrap();
        r.up(None, None).unwrap();
        r.down(None, Some(&last)).unwrap();
        assert_eq!(fires.load(Ordering::SeqCst), 0);
        r.down(None, Some(&last)).unwrap();
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cond_vetoes_increment() {
        let r = SharedRef::new();
        let cond = || false;
        r.up(Some(&cond), None).unwrap();
        assert_eq!(r.count(), 0);
    }

    #[test]
    fn failing_first_ref_rolls_back_increment() {
        let r = SharedRef::new();
        let first = || Err(Error::code(crate::error::ErrorCode::Other));
        assert!(r.up(None, Some(&first)).is_err());
        assert_eq!(r.count(), 0);
    }
}

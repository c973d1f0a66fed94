// SPDX-License-Identifier: Apache-2.0

//! The process-wide irrevocability gate: many concurrent revocable
//! transactions may run as readers, but an irrevocable transaction needs
//! exclusive access (it may perform operations it cannot undo). Grounded on
//! `tx_shared.c`, whose header carries a `\todo` noting this coarse lock
//! could one day be replaced by a finer-grained scheme; this crate keeps the
//! same coarse design, expressed as a genuinely-blocking `RwLock` rather
//! than the non-blocking primitive the rest of the kernel uses, since
//! waiting here is cheap and rare by construction (there is at most one
//! irrevocable transaction system-wide).

use lazy_static::lazy_static;
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "no_deadlocks")]
use no_deadlocks::{RwLock, RwLockReadGuard, RwLockWriteGuard};
#[cfg(not(feature = "no_deadlocks"))]
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

struct SharedState {
    gate: RwLock<()>,
    exclusive_tx: AtomicU64,
}

const NO_EXCLUSIVE_TX: u64 = 0;

lazy_static! {
    static ref SHARED: SharedState = SharedState {
        gate: RwLock::new(()),
        exclusive_tx: AtomicU64::new(NO_EXCLUSIVE_TX),
    };
}

/// A held claim on the irrevocability gate. Dropping it releases the gate,
/// mirroring `tx_shared_release_irrevocability`.
pub enum GateGuard {
    Revocable(RwLockReadGuard<'static, ()>),
    Irrevocable(RwLockWriteGuard<'static, ()>),
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        if let GateGuard::Irrevocable(_) = self {
            SHARED.exclusive_tx.store(NO_EXCLUSIVE_TX, Ordering::Release);
        }
        log::trace!("released irrevocability gate");
    }
}

/// Acquires the gate as one of potentially many concurrent revocable
/// transactions. Blocks only while an irrevocable transaction is running.
pub fn wait_revocable() -> GateGuard {
    log::trace!("waiting to enter as revocable");
    let guard = SHARED.gate.read().expect("irrevocability gate poisoned");
    GateGuard::Revocable(guard)
}

/// Acquires the gate exclusively, marking `tx_id` as the running
/// irrevocable transaction. Blocks until every revocable transaction has
/// released its read claim.
pub fn make_irrevocable(tx_id: u64) -> GateGuard {
    log::trace!("waiting to enter as irrevocable (tx {})", tx_id);
    let guard = SHARED.gate.write().expect("irrevocability gate poisoned");
    SHARED.exclusive_tx.store(tx_id, Ordering::Release);
    GateGuard::Irrevocable(guard)
}

pub fn exclusive_tx() -> Option<u64> {
    let tx = SHARED.exclusive_tx.load(Ordering::Acquire);
    if tx == NO_EXCLUSIVE_TX {
        None
    } else {
        Some(tx)
    }
}

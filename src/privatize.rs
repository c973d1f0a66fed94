// SPDX-License-Identifier: Apache-2.0

//! Privatization: the mechanism a module uses to tell the kernel (and
//! through it, any other module watching the same address range, such as a
//! memory-STM module) that this transaction is about to read or write a
//! region of process memory directly, bypassing the event log. Grounded on
//! `privatize_tx`/`PICOTM_TM_PRIVATIZE_LOAD`/`_STORE`/`_LOADSTORE`, as called
//! from `fcntl.c`'s and `stdio.c`'s syscall wrappers before they touch a
//! caller-supplied buffer. The core reuses the sparse lock map (C5) keyed on
//! byte address instead of record number: a privatized load takes a read
//! lock on the range, a privatized store takes a write lock, exactly as a
//! file-region lock would.

use crate::error::Error;
use crate::lockmap::{CounterMap, LockMap};
use lazy_static::lazy_static;

/// Which kind of access a module is about to perform on a privatized range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Load,
    Store,
    LoadStore,
}

lazy_static! {
    /// Process-wide map of byte-range locks, shared by every transaction
    /// that privatizes memory. Distinct from any per-resource `LockMap` a
    /// module keeps for its own bookkeeping.
    static ref PRIVATE_MAP: LockMap = LockMap::new();
}

/// Per-transaction companion to [`PRIVATE_MAP`]. A [`crate::transaction::Transaction`]
/// owns one of these and releases it wholesale on commit/rollback cleanup.
#[derive(Default)]
pub struct PrivateRegions {
    counters: CounterMap,
}

impl PrivateRegions {
    pub fn new() -> Self {
        PrivateRegions {
            counters: CounterMap::new(),
        }
    }

    /// Marks `[address, address + length)` as accessed by this transaction
    /// in the given mode. A `Load` takes a read lock on the range; `Store`
    /// and `LoadStore` take a write lock.
    pub fn privatize(&mut self, address: usize, length: usize, access: Access) -> Result<(), Error> {
        if length == 0 {
            return Ok(());
        }
        match access {
            Access::Load => self.counters.rdlock_region(&PRIVATE_MAP, address as u64, length as u64),
            Access::Store | Access::LoadStore => {
                self.counters.wrlock_region(&PRIVATE_MAP, address as u64, length as u64)
            }
        }
    }

    /// Releases every privatized range this transaction still holds. Called
    /// once from the driver's commit/rollback cleanup, mirroring the way
    /// record locks are released en masse when a module finishes.
    pub fn release_all(&mut self) {
        self.counters.unlock_all(&PRIVATE_MAP);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_then_store_same_transaction_is_idempotent() {
        let mut regions = PrivateRegions::new();
        regions.privatize(100, 8, Access::Load).unwrap();
        regions.privatize(100, 8, Access::Store).unwrap();
        regions.release_all();
    }

    #[test]
    fn concurrent_store_conflicts_across_transactions() {
        let mut a = PrivateRegions::new();
        a.privatize(200, 4, Access::Store).unwrap();

        let mut b = PrivateRegions::new();
        assert!(b.privatize(200, 4, Access::Load).is_err());

        a.release_all();
        assert!(b.privatize(200, 4, Access::Load).is_ok());
        b.release_all();
    }
}

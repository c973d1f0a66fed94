// SPDX-License-Identifier: Apache-2.0

//! # txkernel
//!
//! A system-level transaction manager: a log-based, two-phase-locking
//! kernel for brokering atomic, isolated side effects on OS-level
//! resources (file descriptors, memory, and similar state) across
//! concurrent threads, with an escape hatch for transactions that must run
//! alone because they perform operations that cannot be undone.
//!
//! The kernel itself is resource-agnostic. A **module** (see
//! [`module::Module`]) binds one resource class to the kernel's event log
//! and concurrency-control primitives; this crate ships one illustrative
//! module, [`demo::DemoCellShared`], to exercise the machinery end to end.
//!
//! Most callers only need [`atomically`], which runs a closure to
//! completion, retrying automatically on conflict:
//!
//! ```
//! use std::sync::Arc;
//! use txkernel::demo::{read, write, DemoCellShared};
//!
//! let cell = DemoCellShared::new(0u32);
//!
//! txkernel::atomically(|tx| {
//!     let id = txkernel::demo::DemoCellHandle::register(tx, cell.clone())?;
//!     let value = read::<u32>(tx, id);
//!     write(tx, id, value + 1);
//!     Ok(())
//! })
//! .expect("transaction failed");
//!
//! assert_eq!(cell.get(), 1);
//! ```

pub mod demo;
pub mod driver;
pub mod error;
pub mod eventlog;
pub mod lockmap;
pub mod module;
pub mod privatize;
pub mod rwlock;
pub mod rwstate;
pub mod shared;
pub mod sharedref;
pub mod table;
pub mod transaction;

pub use error::{Error, ErrorCode, ErrorKind};
pub use module::Module;
pub use transaction::{Mode, Transaction};

use lazy_static::lazy_static;

lazy_static! {
    static ref KERNEL: driver::Kernel = driver::Kernel::new();
}

/// Runs `body` as a transaction, retrying automatically on conflict. See
/// [`driver::Kernel::atomically`] for the exact retry/recovery contract.
pub fn atomically<F, T>(body: F) -> Result<T, Error>
where
    F: Fn(&mut Transaction) -> Result<T, Error>,
{
    KERNEL.atomically(body)
}

/// Runs `body` as an irrevocable transaction: it executes alone, excluding
/// every other transaction for its duration, and may perform operations it
/// cannot undo.
pub fn irrevocably<F, T>(body: F) -> Result<T, Error>
where
    F: Fn(&mut Transaction) -> Result<T, Error>,
{
    KERNEL.atomically_irrevocable(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use demo::{read, write, DemoCellHandle, DemoCellShared};

    #[test]
    fn single_transaction_commits() {
        let cell = DemoCellShared::new(0u32);
        let result = atomically(|tx| {
            let id = DemoCellHandle::register(tx, cell.clone())?;
            let value = read::<u32>(tx, id);
            write(tx, id, value + 1);
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(cell.get(), 1);
    }

    #[test]
    fn irrevocable_transaction_commits() {
        let cell = DemoCellShared::new(10u32);
        irrevocably(|tx| {
            let id = DemoCellHandle::register(tx, cell.clone())?;
            write(tx, id, 20u32);
            Ok(())
        })
        .expect("transaction failed");
        assert_eq!(cell.get(), 20);
    }
}

// SPDX-License-Identifier: Apache-2.0

//! The retry loop that replaces the original non-local-jump-based restart
//! mechanism. There is no `setjmp`/`longjmp` in safe Rust: instead, every
//! fallible call in [`crate::transaction::Transaction`] returns
//! `Result<_, Error>`, and [`atomically`] is the loop that owns the retry,
//! exactly as `Stm::read_write` owns its own commit-or-retry loop around a
//! user closure. `picotm.c`'s `restart_tx` maps onto the match arms below:
//! a conflict restarts silently, a non-recoverable error aborts the
//! process, and anything else is handed to the caller.

use crate::error::{Error, ErrorCode};
use crate::transaction::{Mode, Transaction};
use std::sync::atomic::{AtomicU64, Ordering};

/// `true` if `err` is the domain error a module raises from
/// [`Transaction::irrevocable`](crate::transaction::Transaction::irrevocable)
/// to demand the transaction restart running alone.
fn wants_irrevocable(err: &Error) -> bool {
    err.as_error_code() == Some(ErrorCode::IrrevocabilityRequired)
}

/// Issues monotonically increasing transaction ids, the same role
/// `Stm::transaction_ids` plays in the sibling memory-STM crate.
#[derive(Default)]
pub struct Kernel {
    tx_ids: AtomicU64,
}

impl Kernel {
    pub fn new() -> Self {
        Kernel {
            tx_ids: AtomicU64::new(1),
        }
    }

    fn next_tx_id(&self) -> u64 {
        self.tx_ids.fetch_add(1, Ordering::SeqCst)
    }

    /// Runs `body` to completion, retrying on conflict until it commits.
    /// A non-conflict error rolls the transaction back and is returned to
    /// the caller; a non-recoverable error aborts the process, since the
    /// kernel cannot trust that a retry would leave state consistent.
    pub fn atomically<F, T>(&self, body: F) -> Result<T, Error>
    where
        F: Fn(&mut Transaction) -> Result<T, Error>,
    {
        let id = self.next_tx_id();
        let mut mode = Mode::Revocable;

        loop {
            let mut tx = Transaction::new(id);
            tx.begin(mode)?;
            log::info!("tx({}): start ({:?})", id, mode);

            match body(&mut tx) {
                Ok(value) => match tx.commit() {
                    Ok(()) => {
                        log::info!("tx({}): committed", id);
                        return Ok(value);
                    }
                    Err(err) if err.is_non_recoverable() => {
                        log::error!("tx({}): non-recoverable commit error: {}", id, err);
                        std::process::abort();
                    }
                    Err(err) if err.is_conflict() => {
                        log::info!("tx({}): commit conflict, retrying", id);
                        mode = Mode::Retry;
                        continue;
                    }
                    Err(err) if wants_irrevocable(&err) => {
                        log::info!("tx({}): commit requires irrevocability, restarting", id);
                        mode = Mode::Irrevocable;
                        continue;
                    }
                    Err(err) => {
                        log::info!("tx({}): commit error, giving up: {}", id, err);
                        return Err(err);
                    }
                },
                Err(err) => {
                    let _ = tx.rollback();
                    if err.is_non_recoverable() {
                        log::error!("tx({}): non-recoverable error: {}", id, err);
                        std::process::abort();
                    }
                    if err.is_conflict() {
                        log::info!("tx({}): rolled back on conflict, retrying", id);
                        mode = Mode::Retry;
                        continue;
                    }
                    if wants_irrevocable(&err) {
                        log::info!("tx({}): rolled back, restarting as irrevocable", id);
                        mode = Mode::Irrevocable;
                        continue;
                    }
                    log::info!("tx({}): rolled back, giving up: {}", id, err);
                    return Err(err);
                }
            }
        }
    }

    /// Runs `body` forcing the transaction to be irrevocable from the
    /// start, skipping the revocable-first attempt. Used when the caller
    /// already knows the work involves an irreversible operation.
    pub fn atomically_irrevocable<F, T>(&self, body: F) -> Result<T, Error>
    where
        F: Fn(&mut Transaction) -> Result<T, Error>,
    {
        let id = self.next_tx_id();
        let mut tx = Transaction::new(id);
        tx.begin(Mode::Irrevocable)?;
        log::info!("tx({}): start (Irrevocable)", id);

        match body(&mut tx) {
            Ok(value) => match tx.commit() {
                Ok(()) => Ok(value),
                Err(err) if err.is_non_recoverable() => {
                    log::error!("tx({}): non-recoverable commit error: {}", id, err);
                    std::process::abort();
                }
                Err(err) => Err(err),
            },
            Err(err) => {
                let _ = tx.rollback();
                Err(err)
            }
        }
    }
}

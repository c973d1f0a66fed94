// SPDX-License-Identifier: Apache-2.0

//! The per-thread transaction object: owns the event log, the registered
//! modules, and the current mode, and drives the commit/rollback protocol
//! across them. Grounded on `tx.c`: `tx_commit`'s exact stage order (lock,
//! validate, apply, update_cc, unlock in reverse, finish, release gate) and
//! `tx_rollback`'s symmetric (undo, clear_cc, finish, release gate) are
//! reproduced here, minus the setjmp-based restart machinery which lives in
//! [`crate::driver`] instead.

use crate::error::{Error, ErrorCode};
use crate::eventlog::EventLog;
use crate::module::Module;
use crate::privatize::{Access, PrivateRegions};
use crate::shared::{self, GateGuard};

/// How a transaction is about to run, or how it must be re-entered after a
/// restart. Mirrors the three-valued mode the original control flow passes
/// across its restart jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Retry,
    Revocable,
    Irrevocable,
}

/// Registering more modules than this exhausts the transaction's fixed
/// capacity. Chosen generously: real modules (one per resource class) are a
/// handful, not hundreds.
pub const MAX_MODULES: usize = 64;

pub struct Transaction {
    pub(crate) id: u64,
    log: EventLog,
    modules: Vec<Box<dyn Module>>,
    mode: Mode,
    gate: Option<GateGuard>,
    last_error: Option<Error>,
    privatized: PrivateRegions,
}

impl Transaction {
    pub fn new(id: u64) -> Self {
        Transaction {
            id,
            log: EventLog::new(),
            modules: Vec::new(),
            mode: Mode::Revocable,
            gate: None,
            last_error: None,
            privatized: PrivateRegions::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_irrevocable(&self) -> bool {
        self.mode == Mode::Irrevocable
    }

    pub fn is_valid(&self) -> bool {
        self.gate.is_some()
    }

    pub fn last_error(&self) -> Option<Error> {
        self.last_error
    }

    pub fn set_last_error(&mut self, error: Error) {
        self.last_error = Some(error);
    }

    pub fn clear_last_error(&mut self) {
        self.last_error = None;
    }

    /// Registers a module, returning its stable integer identifier. Fails
    /// once [`MAX_MODULES`] is reached, matching `tx_register_module`'s
    /// `-ENOMEM` on a full table.
    pub fn register_module(&mut self, module: Box<dyn Module>) -> Result<u16, Error> {
        if self.modules.len() >= MAX_MODULES {
            return Err(Error::code(ErrorCode::ModuleLimitExceeded));
        }
        let id = self.modules.len() as u16;
        self.modules.push(module);
        log::debug!("tx({}): registered module {}", self.id, id);
        Ok(id)
    }

    pub fn module_mut(&mut self, module_id: u16) -> Option<&mut Box<dyn Module>> {
        self.modules.get_mut(module_id as usize)
    }

    pub fn inject_event(&mut self, module_id: u16, op_id: u16, cookie: usize) -> usize {
        self.log.inject(module_id, op_id, cookie)
    }

    /// Marks `[address, address + length)` as read and/or written directly
    /// by this transaction, outside the event log, so any other module
    /// watching the same range (a memory-STM module, say) observes the
    /// access. See [`crate::privatize`].
    pub fn privatize(&mut self, address: usize, length: usize, access: Access) -> Result<(), Error> {
        self.privatized.privatize(address, length, access)
    }

    /// Builds a conflict error naming `other_tx` as the transaction this
    /// one lost a race against. A module calls this instead of constructing
    /// an `Error` directly so the choice of error shape stays centralized.
    pub fn resolve_conflict(&self, other_tx: Option<u64>) -> Error {
        Error::conflicting(other_tx)
    }

    /// Builds a recoverable error from a domain error code, for a module to
    /// return from one of its trait methods.
    pub fn recover_from_error_code(&self, code: ErrorCode) -> Error {
        Error::code(code)
    }

    /// Builds a recoverable error from an OS `errno` value.
    pub fn recover_from_errno(&self, errno: i32) -> Error {
        Error::errno(errno)
    }

    /// Passes an already-constructed error through unchanged; offered for
    /// symmetry with `recover_from_error_code`/`recover_from_errno` so a
    /// module can route every recovery path through the same call shape.
    pub fn recover_from_error(&self, error: &Error) -> Error {
        *error
    }

    /// Signals that this transaction can no longer run revocably: some
    /// module is about to perform an operation it cannot undo. Returns
    /// `Ok(())` if the transaction is already irrevocable, otherwise an
    /// error that the enclosing retry loop (see [`crate::driver`])
    /// interprets as "roll back and restart in `Irrevocable` mode".
    pub fn irrevocable(&mut self) -> Result<(), Error> {
        if self.is_irrevocable() {
            return Ok(());
        }
        Err(Error::code(ErrorCode::IrrevocabilityRequired))
    }

    /// Requests an unconditional restart: rolls this attempt back and
    /// re-enters the transaction body, the same way a detected conflict
    /// does. User code calls this from the body closure (returning the
    /// resulting error) when it decides on its own that retrying is the
    /// right move, independent of any lock conflict.
    pub fn restart(&self) -> Error {
        Error::conflicting(None)
    }

    /// Acquires the irrevocability gate in the requested mode. `Retry` is
    /// treated the same as `Revocable` on (re-)entry: only a prior
    /// `irrevocable()` upgrade within this attempt forces the exclusive
    /// path.
    pub fn begin(&mut self, mode: Mode) -> Result<(), Error> {
        self.mode = mode;
        self.clear_last_error();
        let gate = match mode {
            Mode::Irrevocable => shared::make_irrevocable(self.id),
            Mode::Revocable | Mode::Retry => shared::wait_revocable(),
        };
        self.gate = Some(gate);
        log::debug!("tx({}): begin ({:?})", self.id, mode);
        Ok(())
    }

    /// Runs the commit protocol. On success, every module has applied its
    /// events and released its locks and the irrevocability gate is free
    /// again. On failure, everything locked during this attempt has
    /// already been unlocked and the gate released before the error is
    /// returned; the caller only needs to act on the error.
    pub fn commit(&mut self) -> Result<(), Error> {
        let noundo = self.is_irrevocable();
        log::debug!("tx({}): commit (noundo={})", self.id, noundo);

        let mut locked = 0usize;
        let result = (|| {
            for module in self.modules.iter_mut() {
                module.lock()?;
                locked += 1;
            }
            for module in self.modules.iter_mut() {
                module.is_valid(noundo)?;
            }
            self.log.apply_events(&mut self.modules, noundo)?;
            for module in self.modules.iter_mut() {
                module.update_cc(noundo)?;
            }
            Ok(())
        })();

        for module in self.modules[..locked].iter_mut().rev() {
            module.unlock();
        }
        for module in self.modules.iter_mut() {
            module.finish();
        }
        self.log.clear();
        self.privatized.release_all();
        self.gate = None;

        if let Err(ref err) = result {
            log::debug!("tx({}): commit failed: {}", self.id, err);
        }
        result
    }

    /// Runs the rollback protocol: undo every event in reverse order, clear
    /// concurrency-control state, finish every module, release the gate.
    pub fn rollback(&mut self) -> Result<(), Error> {
        let noundo = self.is_irrevocable();
        log::debug!("tx({}): rollback (noundo={})", self.id, noundo);

        let result = self.log.undo_events(&mut self.modules, noundo).and_then(|_| {
            for module in self.modules.iter_mut() {
                module.clear_cc(noundo)?;
            }
            Ok(())
        });

        for module in self.modules.iter_mut() {
            module.finish();
        }
        self.log.clear();
        self.privatized.release_all();
        self.gate = None;

        result
    }

    /// Releases the transaction: uninitializes every registered module in
    /// registration order and drops its claim on the gate, if any.
    pub fn release(&mut self) {
        for module in self.modules.iter_mut() {
            module.uninit();
        }
        self.modules.clear();
        self.privatized.release_all();
        self.gate = None;
    }
}

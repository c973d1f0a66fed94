// SPDX-License-Identifier: Apache-2.0

//! A minimal illustrative module: a single transactional memory cell.
//! Exercises the whole kernel (event log, lock/validate/apply/update_cc,
//! undo/clear_cc, the rwlock + rwstate primitives) the same way a real
//! file-descriptor or allocator module would, without claiming to model
//! any specific OS resource. Used by the integration tests and the
//! benchmark.

use crate::error::Error;
use crate::eventlog::Event;
use crate::module::Module;
use crate::rwlock::RwLock;
use crate::rwstate::RwState;
use crate::transaction::Transaction;
use std::sync::{Arc, Mutex};

const OP_WRITE: u16 = 0;

/// The resource shared across every transaction that touches this cell:
/// the current value plus the record lock guarding it.
pub struct DemoCellShared<T> {
    lock: RwLock,
    value: Mutex<T>,
}

impl<T: Clone> DemoCellShared<T> {
    pub fn new(value: T) -> Arc<Self> {
        Arc::new(DemoCellShared {
            lock: RwLock::new(),
            value: Mutex::new(value),
        })
    }

    pub fn get(&self) -> T {
        self.value.lock().expect("demo cell mutex poisoned").clone()
    }
}

/// The per-transaction handle bound to one [`DemoCellShared`]. Registered
/// with a transaction via [`DemoCellHandle::register`]; `read`/`write` are
/// then called on the handle borrowed back out of the transaction.
pub struct DemoCellHandle<T> {
    shared: Arc<DemoCellShared<T>>,
    state: RwState,
    wants_write: bool,
    pending: Option<T>,
    previous: Option<T>,
    /// The value observed the first time this transaction read the cell's
    /// committed state (not its own pending write). `is_valid` re-checks
    /// this against the live value under the commit-time lock, so a
    /// read-modify-write that raced another transaction's commit is caught
    /// as a conflict instead of silently overwriting it.
    read_snapshot: Option<T>,
}

impl<T: Clone + Send + PartialEq + 'static> DemoCellHandle<T> {
    /// Registers a fresh handle onto `shared` with `tx` and returns both
    /// the module id (for `inject_event`/`module_mut` lookups) and nothing
    /// else: callers drive reads/writes back through
    /// `tx.module_mut(id)` downcast, or more simply through the
    /// [`read`]/[`write`] free functions below, which do that downcast for
    /// them.
    pub fn register(tx: &mut Transaction, shared: Arc<DemoCellShared<T>>) -> Result<u16, Error> {
        let handle = DemoCellHandle {
            shared,
            state: RwState::new(),
            wants_write: false,
            pending: None,
            previous: None,
            read_snapshot: None,
        };
        tx.register_module(Box::new(handle))
    }
}

impl<T: Clone + Send + PartialEq + 'static> Module for DemoCellHandle<T> {
    fn lock(&mut self) -> Result<(), Error> {
        if self.wants_write {
            self.state.try_wrlock(&self.shared.lock)
        } else {
            self.state.try_rdlock(&self.shared.lock)
        }
    }

    fn unlock(&mut self) {
        self.state.unlock(&self.shared.lock);
    }

    fn is_valid(&mut self, _noundo: bool) -> Result<(), Error> {
        if let Some(expected) = &self.read_snapshot {
            let current = self.shared.value.lock().expect("demo cell mutex poisoned");
            if *current != *expected {
                return Err(Error::conflicting(None));
            }
        }
        Ok(())
    }

    fn apply_events(&mut self, events: &[Event], _noundo: bool) -> Result<(), Error> {
        if events.iter().any(|e| e.op_id == OP_WRITE) {
            if let Some(value) = self.pending.take() {
                *self.shared.value.lock().expect("demo cell mutex poisoned") = value;
            }
        }
        Ok(())
    }

    fn undo_events(&mut self, events: &[Event], _noundo: bool) -> Result<(), Error> {
        if events.iter().any(|e| e.op_id == OP_WRITE) {
            if let Some(value) = self.previous.take() {
                *self.shared.value.lock().expect("demo cell mutex poisoned") = value;
            }
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.wants_write = false;
        self.pending = None;
        self.previous = None;
        self.read_snapshot = None;
    }
}

/// Reads the current value: the pending write of this transaction if one
/// was made, otherwise the committed value. Injects no event — reads are
/// not replayed on commit or rollback, only writes are. The first read of
/// the committed value is remembered as this transaction's read snapshot,
/// re-checked by `is_valid` at commit time.
pub fn read<T: Clone + Send + PartialEq + 'static>(tx: &mut Transaction, module_id: u16) -> T {
    let handle: &mut DemoCellHandle<T> =
        downcast(tx.module_mut(module_id).expect("unknown module id"))
            .expect("module id does not refer to a DemoCellHandle<T>");
    match &handle.pending {
        Some(value) => value.clone(),
        None => {
            let value = handle.shared.get();
            if handle.read_snapshot.is_none() {
                handle.read_snapshot = Some(value.clone());
            }
            value
        }
    }
}

/// Records an intent to write `value`, to be applied on commit or
/// discarded on rollback.
pub fn write<T: Clone + Send + PartialEq + 'static>(tx: &mut Transaction, module_id: u16, value: T) {
    let cookie = {
        let handle: &mut DemoCellHandle<T> = tx
            .module_mut(module_id)
            .and_then(|m| downcast(m))
            .expect("module id does not refer to a DemoCellHandle<T>");
        if handle.previous.is_none() {
            handle.previous = Some(handle.shared.get());
        }
        handle.wants_write = true;
        handle.pending = Some(value);
        0
    };
    tx.inject_event(module_id, OP_WRITE, cookie);
}

fn downcast<T: Clone + Send + PartialEq + 'static>(module: &mut Box<dyn Module>) -> Option<&mut DemoCellHandle<T>> {
    (module.as_mut() as &mut dyn std::any::Any).downcast_mut()
}

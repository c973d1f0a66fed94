// SPDX-License-Identifier: Apache-2.0

//! The plugin interface a resource handler implements to participate in the
//! transaction driver's commit/rollback protocol. Grounded on `module.c`'s
//! vtable of nine optional callbacks: there, a null function pointer means
//! "this module doesn't need this hook"; here, the same default is
//! expressed as a no-op trait method instead of a null check before every
//! call site.

use crate::eventlog::Event;
use crate::error::Error;

/// A participant in the transaction protocol. Every method has a default
/// no-op (or trivially successful) implementation; a concrete module
/// overrides only the hooks it actually needs. `Any` lets callers that
/// registered a concrete module type recover it from the transaction's
/// `Box<dyn Module>` table.
pub trait Module: Send + std::any::Any {
    /// Acquires whatever locks this module needs before validation. Should
    /// not block; contention is reported as [`Error::Conflicting`].
    fn lock(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Releases locks acquired by [`Module::lock`].
    fn unlock(&mut self) {}

    /// Confirms the module's read set is still consistent. `noundo` is set
    /// for an irrevocable transaction, which may use this as a hint that
    /// validation failure is not recoverable by retry.
    fn is_valid(&mut self, _noundo: bool) -> Result<(), Error> {
        Ok(())
    }

    /// Applies a batch of consecutive same-module events from the log, in
    /// chronological order.
    fn apply_events(&mut self, _events: &[Event], _noundo: bool) -> Result<(), Error> {
        Ok(())
    }

    /// Undoes events from the log, always one at a time and in reverse
    /// chronological order across the whole log (the driver guarantees the
    /// ordering; a module only sees its own events).
    fn undo_events(&mut self, _events: &[Event], _noundo: bool) -> Result<(), Error> {
        Ok(())
    }

    /// Updates any concurrency-control bookkeeping (e.g. version stamps)
    /// after a successful commit.
    fn update_cc(&mut self, _noundo: bool) -> Result<(), Error> {
        Ok(())
    }

    /// Clears concurrency-control bookkeeping after a rollback.
    fn clear_cc(&mut self, _noundo: bool) -> Result<(), Error> {
        Ok(())
    }

    /// Runs after either commit or rollback has fully completed for this
    /// module, regardless of outcome.
    fn finish(&mut self) {}

    /// Tears the module down when the owning transaction is released
    /// (thread exit or an explicit [`crate::transaction::Transaction::release`]
    /// call), in registration order. Distinct from [`Module::finish`], which
    /// runs once per commit/rollback attempt; `uninit` runs once, at the end
    /// of the module's lifetime in the transaction. Most modules need
    /// nothing here and rely on `Drop` for their own resource's teardown.
    fn uninit(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl Module for Noop {}

    #[test]
    fn default_methods_are_infallible_noops() {
        let mut m = Noop;
        assert!(m.lock().is_ok());
        m.unlock();
        assert!(m.is_valid(false).is_ok());
        assert!(m.apply_events(&[], false).is_ok());
        assert!(m.undo_events(&[], false).is_ok());
        assert!(m.update_cc(false).is_ok());
        assert!(m.clear_cc(false).is_ok());
        m.finish();
        m.uninit();
    }
}

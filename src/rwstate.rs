// SPDX-License-Identifier: Apache-2.0

//! Per-transaction record of a transaction's current relation to one
//! [`RwLock`](crate::rwlock::RwLock). Grounded on the upstream
//! `picotm-lib-rwstate` contract: every acquire is a no-op once the state
//! already reflects the requested mode or better, which lets a module call
//! `try_rdlock`/`try_wrlock` on every access without tracking separately
//! whether it already holds the lock.

use crate::error::Error;
use crate::rwlock::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RwStatus {
    #[default]
    Unlocked,
    RdLocked,
    WrLocked,
}

#[derive(Debug, Default)]
pub struct RwState {
    status: RwStatus,
}

impl RwState {
    pub fn new() -> Self {
        RwState {
            status: RwStatus::Unlocked,
        }
    }

    pub fn status(&self) -> RwStatus {
        self.status
    }

    pub fn set_status(&mut self, status: RwStatus) {
        self.status = status;
    }

    /// No-op if this state already holds at least a read lock.
    pub fn try_rdlock(&mut self, lock: &RwLock) -> Result<(), Error> {
        if self.status != RwStatus::Unlocked {
            return Ok(());
        }
        lock.try_rdlock()?;
        self.status = RwStatus::RdLocked;
        Ok(())
    }

    /// No-op if this state already holds the write lock; upgrades in place
    /// if it holds only a read lock; otherwise acquires fresh.
    pub fn try_wrlock(&mut self, lock: &RwLock) -> Result<(), Error> {
        if self.status == RwStatus::WrLocked {
            return Ok(());
        }
        let upgrade = self.status == RwStatus::RdLocked;
        lock.try_wrlock(upgrade)?;
        self.status = RwStatus::WrLocked;
        Ok(())
    }

    /// No-op if unlocked.
    pub fn unlock(&mut self, lock: &RwLock) {
        match self.status {
            RwStatus::Unlocked => {}
            RwStatus::RdLocked => {
                lock.unlock_rd();
                self.status = RwStatus::Unlocked;
            }
            RwStatus::WrLocked => {
                lock.unlock_wr();
                self.status = RwStatus::Unlocked;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_rdlock_is_noop() {
        let lock = RwLock::new();
        let mut state = RwState::new();
        state.try_rdlock(&lock).unwrap();
        state.try_rdlock(&lock).unwrap();
        assert_eq!(state.status(), RwStatus::RdLocked);
        state.unlock(&lock);
        assert!(lock.is_unlocked());
    }

    #[test]
    fn wrlock_upgrades_from_rdlock() {
        let lock = RwLock::new();
        let mut state = RwState::new();
        state.try_rdlock(&lock).unwrap();
        state.try_wrlock(&lock).unwrap();
        assert_eq!(state.status(), RwStatus::WrLocked);
        state.unlock(&lock);
        assert!(lock.is_unlocked());
    }

    #[test]
    fn unlock_on_unlocked_state_is_noop() {
        let lock = RwLock::new();
        let mut state = RwState::new();
        state.unlock(&lock);
        assert_eq!(state.status(), RwStatus::Unlocked);
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Sparse, page-indexed map from an integer key (e.g. a record number
//! derived from a byte offset) to a per-record reader/writer lock, plus the
//! per-transaction counter map that tracks how many times *this*
//! transaction has already taken each record's lock. Grounded on
//! `rwlockmap.c` (the shared, page-creating lock map) and
//! `rwcountermap.c` (the private, per-transaction companion map with the
//! same page shape).

use crate::error::Error;
use crate::rwlock::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Records per page. Kept small so a sparsely-touched key space doesn't
/// force large contiguous allocations; `rwlockmap.c` uses the same shift-based
/// page selection with its own page size.
pub const PAGE_BITS: u32 = 6;
pub const PAGE_ENTRIES: u64 = 1 << PAGE_BITS;

fn page_index(key: u64) -> u64 {
    key >> PAGE_BITS
}

fn in_page_offset(key: u64) -> u64 {
    key & (PAGE_ENTRIES - 1)
}

struct LockPage {
    locks: Vec<RwLock>,
}

impl LockPage {
    fn new() -> Self {
        let mut locks = Vec::with_capacity(PAGE_ENTRIES as usize);
        locks.resize_with(PAGE_ENTRIES as usize, RwLock::new);
        LockPage { locks }
    }
}

/// The shared lock map. Pages are created lazily on first touch and never
/// removed for the lifetime of the map, matching the upstream map's
/// lifetime contract (record locks outlive any single transaction).
#[derive(Default)]
pub struct LockMap {
    pages: Mutex<HashMap<u64, Arc<LockPage>>>,
}

impl LockMap {
    pub fn new() -> Self {
        LockMap {
            pages: Mutex::new(HashMap::new()),
        }
    }

    fn find_page(&self, key: u64) -> Arc<LockPage> {
        let idx = page_index(key);
        let mut pages = self.pages.lock().expect("lock map mutex poisoned");
        pages.entry(idx).or_insert_with(|| Arc::new(LockPage::new())).clone()
    }
}

#[derive(Clone, Copy, Default)]
struct Counter {
    read: u32,
    write: u32,
}

struct CounterPage {
    lockpg: Option<Arc<LockPage>>,
    counters: Vec<Counter>,
}

impl CounterPage {
    fn new() -> Self {
        CounterPage {
            lockpg: None,
            counters: vec![Counter::default(); PAGE_ENTRIES as usize],
        }
    }

    fn resolve(&mut self, key: u64, map: &LockMap) -> Arc<LockPage> {
        if let Some(pg) = &self.lockpg {
            return pg.clone();
        }
        let pg = map.find_page(key);
        self.lockpg = Some(pg.clone());
        pg
    }
}

/// The per-transaction companion to [`LockMap`]: records how many times
/// this transaction has already acquired each record's lock so repeated
/// acquisitions inside one transaction are idempotent, and so rollback
/// releases each lock exactly once.
#[derive(Default)]
pub struct CounterMap {
    pages: HashMap<u64, CounterPage>,
}

impl CounterMap {
    pub fn new() -> Self {
        CounterMap { pages: HashMap::new() }
    }

    fn for_each_in_range(
        &mut self,
        map: &LockMap,
        mut offset: u64,
        mut length: u64,
        mut op: impl FnMut(&mut Counter, &RwLock) -> Result<(), Error>,
    ) -> Result<(), Error> {
        while length > 0 {
            let idx = page_index(offset);
            let page = self.pages.entry(idx).or_insert_with(CounterPage::new);
            let lockpg = page.resolve(offset, map);

            let start = in_page_offset(offset) as usize;
            let avail = PAGE_ENTRIES as usize - start;
            let take = (length as usize).min(avail);

            for i in 0..take {
                op(&mut page.counters[start + i], &lockpg.locks[start + i])?;
            }

            offset += take as u64;
            length -= take as u64;
        }
        Ok(())
    }

    pub fn rdlock_region(&mut self, map: &LockMap, offset: u64, length: u64) -> Result<(), Error> {
        self.for_each_in_range(map, offset, length, |counter, lock| {
            if counter.write > 0 || counter.read > 0 {
                counter.read += 1;
                return Ok(());
            }
            lock.try_rdlock()?;
            counter.read = 1;
            Ok(())
        })
    }

    pub fn wrlock_region(&mut self, map: &LockMap, offset: u64, length: u64) -> Result<(), Error> {
        self.for_each_in_range(map, offset, length, |counter, lock| {
            if counter.write > 0 {
                counter.write += 1;
                return Ok(());
            }
            let upgrade = counter.read > 0;
            lock.try_wrlock(upgrade)?;
            counter.write = 1;
            Ok(())
        })
    }

    pub fn unlock_region(&mut self, map: &LockMap, offset: u64, length: u64) {
        let _: Result<(), Error> = self.for_each_in_range(map, offset, length, |counter, lock| {
            if counter.write > 0 {
                counter.write -= 1;
                if counter.write == 0 {
                    // A record read before being written holds a single
                    // upgraded write lock, not two separate locks: the read
                    // count never got its own `try_rdlock`. Clear it here so
                    // the write-release below is the only release, and a
                    // stray later call never finds `read > 0` and tries to
                    // `unlock_rd` an already-released, write-state lock.
                    counter.read = 0;
                    lock.unlock_wr();
                }
            } else if counter.read > 0 {
                counter.read -= 1;
                if counter.read == 0 {
                    lock.unlock_rd();
                }
            }
            Ok(())
        });
    }

    /// Releases every region this transaction still holds, used on
    /// rollback / commit cleanup when individual extents aren't tracked by
    /// the caller.
    pub fn unlock_all(&mut self, map: &LockMap) {
        let entries: Vec<u64> = self.pages.keys().copied().collect();
        for idx in entries {
            let offset = idx * PAGE_ENTRIES;
            self.unlock_region(map, offset, PAGE_ENTRIES);
        }
    }
}

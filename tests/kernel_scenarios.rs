// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use threadpool::ThreadPool;
use txkernel::demo::{read, write, DemoCellHandle, DemoCellShared};
use txkernel::{atomically, irrevocably, Error, ErrorCode};

#[test]
fn single_thread_counter_commits_once() {
    let g = DemoCellShared::new(0u64);
    let g1 = g.clone();

    atomically(move |tx| {
        let id = DemoCellHandle::register(tx, g1.clone())?;
        let value = read::<u64>(tx, id);
        write(tx, id, value + 1);
        Ok(())
    })
    .expect("transaction failed");

    assert_eq!(g.get(), 1);
}

#[test]
fn two_threads_racing_increment_reach_expected_total_with_no_lost_update() {
    let g = DemoCellShared::new(0u64);
    let pool = ThreadPool::new(2);

    for _ in 0..2 {
        let g1 = g.clone();
        pool.execute(move || {
            atomically(move |tx| {
                let id = DemoCellHandle::register(tx, g1.clone())?;
                let value = read::<u64>(tx, id);
                write(tx, id, value + 1);
                Ok(())
            })
            .expect("transaction failed");
        });
    }
    pool.join();

    assert_eq!(g.get(), 2);
}

#[test]
fn rollback_restores_pre_transaction_value() {
    let cell = DemoCellShared::new(7u32);
    let cell1 = cell.clone();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts1 = attempts.clone();

    let result = atomically(move |tx| {
        let id = DemoCellHandle::register(tx, cell1.clone())?;
        write(tx, id, 99u32);
        if attempts1.fetch_add(1, Ordering::SeqCst) == 0 {
            // Force a restart before this attempt ever commits, so the
            // write above must be undone and the shared cell left
            // untouched.
            return Err(tx.restart());
        }
        Ok(())
    });

    assert!(result.is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(cell.get(), 99);
}

#[test]
fn rollback_on_permanent_error_leaves_resource_untouched() {
    let cell = DemoCellShared::new(7u32);
    let cell1 = cell.clone();

    let result: Result<(), Error> = atomically(move |tx| {
        let id = DemoCellHandle::register(tx, cell1.clone())?;
        write(tx, id, 99u32);
        Err(Error::code(ErrorCode::Other))
    });

    assert!(result.is_err());
    assert_eq!(cell.get(), 7, "a transaction that never commits must not mutate shared state");
}

#[test]
fn error_recovery_without_restart_does_not_retry() {
    let recovered = AtomicBool::new(false);
    let attempts = AtomicUsize::new(0);

    let result: Result<(), Error> = atomically(|_tx| {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::code(ErrorCode::InvalidState))
    });

    if result.is_err() {
        recovered.store(true, Ordering::SeqCst);
    }

    assert!(recovered.load(Ordering::SeqCst));
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "no retry should occur for a non-conflict error");
}

#[test]
fn error_recovery_with_restart_eventually_commits() {
    let attempts = AtomicUsize::new(0);

    let result = atomically(|tx| {
        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(tx.restart());
        }
        Ok(())
    });

    assert!(result.is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn irrevocable_transaction_excludes_concurrent_revocable_transactions() {
    let cell = DemoCellShared::new(0u32);
    let cell_a = cell.clone();
    let cell_b = cell.clone();
    let b_started = Arc::new(AtomicBool::new(false));
    let b_observed_a_done = Arc::new(AtomicBool::new(false));
    let b_started1 = b_started.clone();
    let b_observed_a_done1 = b_observed_a_done.clone();

    let a_done = Arc::new(AtomicBool::new(false));
    let a_done1 = a_done.clone();

    let thread_a = std::thread::spawn(move || {
        irrevocably(move |tx| {
            let id = DemoCellHandle::register(tx, cell_a.clone())?;
            std::thread::sleep(Duration::from_millis(150));
            write(tx, id, 1u32);
            Ok(())
        })
        .expect("irrevocable transaction failed");
        a_done1.store(true, Ordering::SeqCst);
    });

    // Give thread A a head start so it has acquired the gate before B tries.
    std::thread::sleep(Duration::from_millis(30));

    let thread_b = std::thread::spawn(move || {
        b_started1.store(true, Ordering::SeqCst);
        let started = Instant::now();
        atomically(move |tx| {
            let id = DemoCellHandle::register(tx, cell_b.clone())?;
            let _ = read::<u32>(tx, id);
            Ok(())
        })
        .expect("revocable transaction failed");
        if started.elapsed() >= Duration::from_millis(100) {
            b_observed_a_done1.store(true, Ordering::SeqCst);
        }
    });

    thread_a.join().unwrap();
    thread_b.join().unwrap();

    assert!(b_started.load(Ordering::SeqCst));
    assert!(
        b_observed_a_done.load(Ordering::SeqCst),
        "begin(Revocable) must not return before the irrevocable transaction commits"
    );
    assert_eq!(cell.get(), 1);
}

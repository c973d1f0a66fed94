// SPDX-License-Identifier: Apache-2.0

use criterion::{criterion_group, criterion_main, Criterion};
use txkernel::demo::{read, write, DemoCellHandle, DemoCellShared};

fn bnc_single_cell_commit(c: &mut Criterion) {
    let cell = DemoCellShared::new(0u64);

    c.bench_function("atomically_increment", |b| {
        b.iter(|| {
            txkernel::atomically(|tx| {
                let id = DemoCellHandle::register(tx, cell.clone())?;
                let value = read::<u64>(tx, id);
                write(tx, id, value.wrapping_add(1));
                Ok(())
            })
            .expect("transaction failed")
        })
    });
}

fn bnc_lockmap_region(c: &mut Criterion) {
    use txkernel::lockmap::{CounterMap, LockMap};

    let map = LockMap::new();

    c.bench_function("lockmap_wrlock_unlock_region", |b| {
        b.iter(|| {
            let mut counters = CounterMap::new();
            counters.wrlock_region(&map, 0, 16).expect("lock conflict");
            counters.unlock_region(&map, 0, 16);
        })
    });
}

criterion_group!(benches, bnc_single_cell_commit, bnc_lockmap_region);
criterion_main!(benches);

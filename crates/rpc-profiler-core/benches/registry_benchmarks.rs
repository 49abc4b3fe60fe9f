//! Registry benchmarks
//!
//! Measures id allocation and the save/retrieve/erase cycle, uncontended
//! and with several threads sharing one registry.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rpc_profiler_core::RemoteProfilerManager;
use std::sync::Arc;

fn bench_next_local_id(c: &mut Criterion) {
    let manager = RemoteProfilerManager::with_worker_id(1u16);
    c.bench_function("next_local_id", |b| {
        b.iter(|| black_box(manager.next_local_id()))
    });
}

fn bench_key_cycle(c: &mut Criterion) {
    let manager = RemoteProfilerManager::with_worker_id(1u16);
    c.bench_function("save_retrieve_erase", |b| {
        b.iter(|| {
            let id = manager.next_profiling_id();
            manager.save_key(id, "rpc_async#aten::add");
            black_box(manager.retrieve_key(id));
            manager.erase_key(id);
        })
    });
}

fn bench_contended_key_cycle(c: &mut Criterion) {
    const THREADS: usize = 4;
    const CALLS: usize = 256;

    let manager = Arc::new(RemoteProfilerManager::with_worker_id(1u16));
    c.bench_function("save_retrieve_erase_4_threads", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let manager = Arc::clone(&manager);
                    std::thread::spawn(move || {
                        for _ in 0..CALLS {
                            let call = manager.begin_remote_call("rpc_sync#udf").unwrap();
                            black_box(call.complete().unwrap());
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_next_local_id,
    bench_key_cycle,
    bench_contended_key_cycle
);
criterion_main!(benches);

//! Fork/join latency with imbalanced leaves.
//!
//! A root task fans out leaves of uneven cost and joins them, stressing the
//! steal path and the last-thief handoff.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lazypool::{Counter, Pool};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn fibonacci(n: u64) -> u64 {
    if n <= 1 {
        return n;
    }
    let mut a = 0u64;
    let mut b = 1u64;
    for _ in 2..=n {
        let next = a.wrapping_add(b);
        a = b;
        b = next;
    }
    b
}

fn bench_fork_join(c: &mut Criterion) {
    let pool = Pool::new(num_cpus::get());

    let mut group = c.benchmark_group("fork_join");
    group.sample_size(10);

    for leaves in [1_000, 10_000] {
        group.throughput(Throughput::Elements(leaves as u64));

        group.bench_function(BenchmarkId::new("imbalanced", leaves), |b| {
            b.iter(|| {
                let acc = Arc::new(AtomicU64::new(0));

                let acc_clone = Arc::clone(&acc);
                let root = pool.run_with_context(move |cx| {
                    let children: Vec<Counter> = (0..leaves)
                        .map(|i| {
                            let acc = Arc::clone(&acc_clone);
                            cx.spawn(move || {
                                // Every tenth leaf is heavy.
                                let work = if i % 10 == 0 { 1000 } else { 10 };
                                acc.fetch_add(
                                    std::hint::black_box(fibonacci(work)),
                                    Ordering::Relaxed,
                                );
                            })
                        })
                        .collect();
                    for child in &children {
                        cx.wait_for(child);
                    }
                });

                pool.wait_for_counter(&root);
                std::hint::black_box(acc.load(Ordering::Relaxed));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fork_join);
criterion_main!(benches);

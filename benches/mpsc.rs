//! Benchmarks for the lossy MPSC ring.
//!
//! Compares against crossbeam-queue's ArrayQueue with `force_push`, the
//! closest bounded-overwrite analogue in the ecosystem.

use std::thread;
use std::time::Instant;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use crossbeam_queue::ArrayQueue;
use lossyring::mpsc;

// ============================================================================
// Single-operation latency benchmarks
// ============================================================================

fn bench_push_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_latency");

    // Uncontended push into a warm ring.
    group.bench_function("lossyring/u64", |b| {
        let (tx, _rx) = mpsc::channel::<u64>(1024);
        b.iter(|| tx.send_unchecked(black_box(42u64)));
    });

    group.bench_function("crossbeam_force_push/u64", |b| {
        let q = ArrayQueue::<u64>::new(1024);
        b.iter(|| q.force_push(black_box(42u64)));
    });

    // 128-byte message
    #[allow(unused)]
    #[derive(Debug, Clone, Copy)]
    struct Message128([u64; 16]);

    group.bench_function("lossyring/128b", |b| {
        let (tx, _rx) = mpsc::channel::<Message128>(1024);
        let msg = Message128([42; 16]);
        b.iter(|| tx.send_unchecked(black_box(msg)));
    });

    group.bench_function("crossbeam_force_push/128b", |b| {
        let q = ArrayQueue::<Message128>::new(1024);
        let msg = Message128([42; 16]);
        b.iter(|| q.force_push(black_box(msg)));
    });

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");

    // One push + one poll, no contention.
    group.bench_function("lossyring/u64", |b| {
        let (tx, mut rx) = mpsc::channel::<u64>(1024);
        b.iter(|| {
            tx.send_unchecked(black_box(42u64));
            black_box(rx.try_recv().ok())
        });
    });

    group.bench_function("crossbeam_array/u64", |b| {
        let q = ArrayQueue::<u64>::new(1024);
        b.iter(|| {
            q.force_push(black_box(42u64));
            black_box(q.pop())
        });
    });

    group.finish();
}

// ============================================================================
// Contended throughput benchmarks
// ============================================================================

fn bench_contended_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_push");

    for producers in [2usize, 4] {
        group.throughput(Throughput::Elements(producers as u64));
        group.bench_function(format!("lossyring/{producers}-producers"), |b| {
            b.iter_custom(|iters| {
                let (tx, rx) = mpsc::channel::<u64>(1024);

                let start = Instant::now();
                let handles: Vec<_> = (0..producers)
                    .map(|_| {
                        let tx = tx.clone();
                        thread::spawn(move || {
                            for i in 0..iters {
                                tx.send_unchecked(i);
                            }
                        })
                    })
                    .collect();

                for handle in handles {
                    handle.join().unwrap();
                }
                let elapsed = start.elapsed();

                drop(rx);
                elapsed
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_push_latency,
    bench_roundtrip,
    bench_contended_push
);
criterion_main!(benches);

//! Reduction Throughput Benchmarks
//!
//! ## Groups
//!
//! - `cell_*`: State cell alone (writer lock, value swap)
//! - `serializer_*`: Reduction plus publication to attached observers
//! - `container_*`: Full path (admission, task spawn, reduction, idling)
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench reduction_throughput
//! cargo bench --bench reduction_throughput -- "serializer"  # specific group
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use orbital_core::container::ReductionSerializer;
use orbital_core::{Container, IdlingRegistry, StateCell};
use rand::Rng;

// =============================================================================
// State Cell
// =============================================================================

fn cell_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell");
    group.throughput(Throughput::Elements(1));

    let cell = StateCell::new(0u64);
    group.bench_function("atomic_update", |b| {
        b.iter(|| black_box(cell.atomic_update(|n| n + 1)))
    });

    group.bench_function("snapshot", |b| b.iter(|| black_box(cell.snapshot())));

    group.finish();
}

// =============================================================================
// Reduction Serializer
// =============================================================================

fn serializer_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("serializer_reduce");
    group.throughput(Throughput::Elements(1));

    for observers in [0usize, 1, 8] {
        let serializer = ReductionSerializer::new(0u64);
        let mut subscriptions: Vec<_> = (0..observers).map(|_| serializer.subscribe()).collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(observers),
            &observers,
            |b, _| {
                b.iter(|| {
                    black_box(serializer.reduce(|n| n + 1)).ok();
                    // Keep queues from growing across iterations.
                    for subscription in &mut subscriptions {
                        while subscription.try_recv().is_some() {}
                    }
                })
            },
        );
    }

    group.finish();
}

// =============================================================================
// Container
// =============================================================================

fn container_benchmarks(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("benchmark runtime");

    let mut group = c.benchmark_group("container_intents");

    for batch in [100usize, 1_000] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            let registry = Arc::new(IdlingRegistry::new());
            let container: Container<Vec<u16>, ()> = Container::builder(Vec::new())
                .idling(registry.clone())
                .runtime(runtime.handle().clone())
                .build()
                .expect("container");
            let ids: Vec<u16> = {
                let mut rng = rand::thread_rng();
                (0..batch).map(|_| rng.gen_range(0..1024)).collect()
            };

            b.iter(|| {
                for &id in &ids {
                    container
                        .submit(move |ctx| async move {
                            ctx.reduce(|list| {
                                let mut list = list.clone();
                                list.push(id);
                                list.truncate(64);
                                list
                            })?;
                            Ok(())
                        })
                        .expect("submit");
                }
                runtime.block_on(registry.wait_for_idle());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    cell_benchmarks,
    serializer_benchmarks,
    container_benchmarks
);
criterion_main!(benches);

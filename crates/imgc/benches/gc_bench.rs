//! imgc Benchmarks
//!
//! Allocation, barrier and collection costs on a small object graph.
//! Run with: `cargo bench --package imgc`

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use imgc::{mutator, Collector, GcConfig, ShadowStack, TypeId, TypeInfo, TypeTable};
use std::sync::Arc;

struct Bench {
    gc: Collector,
    roots: ShadowStack,
    node: TypeId,
    leaf: TypeId,
    ref_array: TypeId,
}

fn create_gc(config: GcConfig) -> Bench {
    let mut types = TypeTable::new();
    let node = types.register(TypeInfo::struct_type("Node", 24, vec![0, 8]));
    let leaf = types.register(TypeInfo::struct_type("Leaf", 16, vec![]));
    let ref_array = types.register(TypeInfo::array_type("RefArray", 8, vec![0]));

    let mut gc = Collector::new(config, Arc::new(types)).unwrap();
    let roots = ShadowStack::new();
    gc.set_root_walker(Box::new(roots.clone()));
    Bench {
        gc,
        roots,
        node,
        leaf,
        ref_array,
    }
}

/// Root a chain of `count` nodes
fn build_chain(bench: &mut Bench, count: usize) {
    let slot = bench.roots.push(0);
    for _ in 0..count {
        let node = bench.gc.allocate(bench.node, 24);
        let head = bench.roots.get(slot);
        unsafe { mutator::store_ref(&mut bench.gc, node, 0, head) };
        bench.roots.set(slot, node);
    }
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");
    group.throughput(Throughput::Elements(1));

    let mut bench = create_gc(GcConfig::default());
    group.bench_function("leaf_24_bytes", |b| {
        b.iter(|| black_box(bench.gc.allocate(bench.leaf, 16)))
    });

    group.bench_function("node_32_bytes", |b| {
        b.iter(|| black_box(bench.gc.allocate(bench.node, 24)))
    });

    group.bench_function("array_16_items", |b| {
        b.iter(|| black_box(bench.gc.allocate_varsize(bench.ref_array, 16)))
    });

    group.finish();
}

fn bench_write_barrier(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_barrier");

    let mut bench = create_gc(GcConfig::default());
    let parent = bench.roots.push(bench.gc.allocate(bench.node, 24));
    bench.gc.collect(0);
    let parent = bench.roots.get(parent);

    // the object is recorded after the first store: this is the fast path
    group.bench_function("recorded_object", |b| {
        b.iter(|| unsafe { mutator::store_ref(&mut bench.gc, parent, 0, black_box(0)) })
    });

    let array = bench.gc.allocate_varsize(bench.ref_array, 100_000);
    bench.roots.push(array);
    group.bench_function("card_marking", |b| {
        let mut index = 0;
        b.iter(|| {
            index = (index + 4099) % 100_000;
            unsafe { mutator::store_array_item(&mut bench.gc, array, index, 0) }
        })
    });

    group.finish();
}

fn bench_minor_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("minor_collection");

    for &survivors in &[0usize, 1_000, 10_000] {
        group.bench_function(format!("survivors_{}", survivors), |b| {
            b.iter_batched(
                || {
                    let mut bench = create_gc(GcConfig::default());
                    build_chain(&mut bench, survivors);
                    bench
                },
                |mut bench| {
                    bench.gc.collect(0);
                    bench
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_full_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_collection");
    group.sample_size(20);

    let mut bench = create_gc(GcConfig::default());
    build_chain(&mut bench, 50_000);
    bench.gc.collect(0);

    group.bench_function("live_50k", |b| b.iter(|| bench.gc.collect(1)));

    group.bench_function("single_step", |b| b.iter(|| black_box(bench.gc.collect_step())));

    group.finish();
}

criterion_group!(
    benches,
    bench_allocation,
    bench_write_barrier,
    bench_minor_collection,
    bench_full_collection
);
criterion_main!(benches);

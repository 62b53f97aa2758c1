//! Benchmarks for TID bitmaps using criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::Tid;
use strata_index::{BitmapLimits, TidBitmap};

fn build(size: u32, stride: u32, limits: BitmapLimits) -> TidBitmap {
    let mut bm = TidBitmap::with_limits(limits);
    for i in (0..size).step_by(stride as usize) {
        bm.add_tid(Tid::new(i / 100, (i % 100) as u16 + 1));
    }
    bm
}

fn bitmap_insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitmap_insert");

    for size in [1_000u32, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::new("exact", size), size, |b, &size| {
            b.iter(|| black_box(build(size, 1, BitmapLimits::unbounded())));
        });
        group.bench_with_input(BenchmarkId::new("lossify", size), size, |b, &size| {
            let limits = BitmapLimits {
                max_exact_per_block: 64,
                max_entries: 4_096,
            };
            b.iter(|| black_box(build(size, 1, limits)));
        });
    }

    group.finish();
}

fn bitmap_combine_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitmap_combine");

    for size in [1_000u32, 10_000, 100_000].iter() {
        let a = build(*size, 2, BitmapLimits::unbounded());
        let b = build(*size, 3, BitmapLimits::unbounded());

        group.bench_with_input(BenchmarkId::new("and", size), size, |bench, _| {
            bench.iter(|| black_box(a.intersect(&b)));
        });
        group.bench_with_input(BenchmarkId::new("or", size), size, |bench, _| {
            bench.iter(|| black_box(a.union(&b)));
        });
        group.bench_with_input(BenchmarkId::new("iterate", size), size, |bench, _| {
            bench.iter(|| black_box(a.iter().map(|p| p.offsets.len()).sum::<usize>()));
        });
    }

    group.finish();
}

criterion_group!(benches, bitmap_insert_benchmark, bitmap_combine_benchmark);
criterion_main!(benches);

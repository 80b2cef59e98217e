use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vset_core::{IndexParams, QuantMode, VectorSet};

fn synthetic_vector(dim: usize, seed: usize) -> Vec<f32> {
    (0..dim).map(|d| ((seed * 7 + d * 3) % 23) as f32 - 11.0).collect()
}

fn build_index(n: usize, dim: usize, quant: QuantMode) -> VectorSet<usize> {
    let vs: VectorSet<usize> = VectorSet::create(IndexParams::balanced(dim, quant)).unwrap();
    for i in 0..n {
        vs.insert(synthetic_vector(dim, i), i).unwrap();
    }
    vs
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for &n in &[1_000usize, 10_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("insert_fp32", n), &n, |b, &n| {
            let vs = build_index(n, 64, QuantMode::None);
            let mut i = n;
            b.iter(|| {
                vs.insert(black_box(synthetic_vector(64, i)), i).unwrap();
                i += 1;
            });
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    for &n in &[1_000usize, 10_000] {
        for quant in [QuantMode::None, QuantMode::Q8, QuantMode::Binary] {
            group.throughput(Throughput::Elements(1));
            group.bench_with_input(BenchmarkId::new(format!("search_{quant:?}"), n), &n, |b, &n| {
                let vs = build_index(n, 64, quant);
                let query = synthetic_vector(64, n / 2);
                b.iter(|| {
                    black_box(vs.search(query.clone(), 10, false).unwrap());
                });
            });
        }
    }
    group.finish();
}

fn bench_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete");
    group.bench_function("delete_then_reinsert", |b| {
        let vs = build_index(5_000, 64, QuantMode::None);
        let mut next_id = 5_000usize;
        b.iter(|| {
            let id = vs.random_node().unwrap();
            vs.delete(id);
            vs.insert(synthetic_vector(64, next_id), next_id).unwrap();
            next_id += 1;
        });
    });
    group.finish();
}

fn bench_serialize_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize");
    group.bench_function("round_trip_10k", |b| {
        let vs = build_index(10_000, 64, QuantMode::None);
        b.iter(|| {
            let bytes = vs.serialize().unwrap();
            let loaded: VectorSet<usize> =
                VectorSet::deserialize(black_box(&bytes), IndexParams::balanced(64, QuantMode::None), 1, 2).unwrap();
            black_box(loaded.len());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_search, bench_delete, bench_serialize_round_trip);
criterion_main!(benches);

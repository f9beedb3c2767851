use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use lineage_core::geometry::{ImageResolution, Position};
use lineage_core::neighbor;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

fn generate_positions(n: usize, t: i32) -> Vec<Position> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|_| {
            Position::new(
                rng.random_range(0.0..2000.0),
                rng.random_range(0.0..2000.0),
                rng.random_range(0.0..100.0),
                t,
            )
        })
        .collect()
}

fn benchmark_neighbor_queries(c: &mut Criterion) {
    const NUM_POSITIONS: usize = 2000;
    let positions = generate_positions(NUM_POSITIONS, 0);
    let res = ImageResolution::new(0.3, 0.3, 1.0, 2.0).unwrap();
    let around = positions[0];

    let mut group = c.benchmark_group("find_closest");
    group.bench_function("linear_scan", |b| {
        b.iter(|| {
            let found = neighbor::find_closest(&positions, &around, &res, false, None);
            black_box(found);
        })
    });
    group.finish();

    let mut group = c.benchmark_group("find_closest_n");
    for n in [5usize, 20, 50] {
        group.bench_function(format!("n={n}"), |b| {
            b.iter(|| {
                let found = neighbor::find_closest_n(&positions, &around, n, &res, None, true);
                black_box(found);
            })
        });
    }
    group.finish();

    let mut group = c.benchmark_group("make_nearby_graph");
    group.bench_function("k=5", |b| {
        b.iter(|| {
            let graph = neighbor::make_nearby_graph(&positions, 5, &res);
            black_box(graph);
        })
    });
    group.finish();
}

criterion_group!(benches, benchmark_neighbor_queries);
criterion_main!(benches);

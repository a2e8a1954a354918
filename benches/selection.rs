use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mobo_core::pareto::{hypervolume, hypervolume_contribution};
use mobo_core::selection::ParetoBuffer;
use mobo_core::selection::graph::IteratedConditionalModes;

/// `n` points on a noisy convex front in `n_obj` objectives.
fn front(n: usize, n_obj: usize) -> Vec<Vec<f64>> {
    let mut rng = fastrand::Rng::with_seed(42);
    (0..n)
        .map(|_| {
            let raw: Vec<f64> = (0..n_obj).map(|_| rng.f64() + 1e-3).collect();
            let norm = raw.iter().map(|v| v * v).sum::<f64>().sqrt();
            raw.iter().map(|v| v / norm + 0.01 * rng.f64()).collect()
        })
        .collect()
}

fn bench_hypervolume(c: &mut Criterion) {
    let mut group = c.benchmark_group("hypervolume");
    for n_obj in [2, 3] {
        for n in [10, 50, 100] {
            let points = front(n, n_obj);
            let reference = vec![1.2; n_obj];
            group.bench_with_input(
                BenchmarkId::new(format!("{n_obj}d"), n),
                &points,
                |b, points| {
                    b.iter(|| hypervolume(points, &reference));
                },
            );
        }
    }
    group.finish();
}

fn bench_contribution(c: &mut Criterion) {
    let points = front(50, 2);
    let candidate = vec![0.5, 0.5];
    c.bench_function("hypervolume_contribution_2d_50", |b| {
        b.iter(|| hypervolume_contribution(&points, &candidate, &[1.2, 1.2]));
    });
}

fn bench_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("pareto_buffer");
    for n_obj in [2, 3] {
        let y = front(200, n_obj);
        let x = y.clone();
        let families: Vec<usize> = (0..y.len()).map(|i| i % 5).collect();
        group.bench_function(format!("insert_{n_obj}d"), |b| {
            b.iter(|| {
                let mut buffer = ParetoBuffer::builder(n_obj).build().unwrap();
                buffer.insert(&x, &y, &families).unwrap();
                buffer
            });
        });

        let mut buffer = ParetoBuffer::builder(n_obj).build().unwrap();
        buffer.insert(&x, &y, &families).unwrap();
        let optimizer = IteratedConditionalModes::default();
        group.bench_function(format!("sparse_approximation_{n_obj}d"), |b| {
            b.iter(|| buffer.sparse_approximation(&optimizer).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_hypervolume, bench_contribution, bench_buffer);
criterion_main!(benches);

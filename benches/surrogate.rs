use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mobo_core::normalization::{Normalization, TrainingSet};
use mobo_core::sampling::latin_hypercube;
use mobo_core::surrogate::{EvalRequest, GaussianProcess, Kernel, SurrogateModel};

/// `n` Latin-hypercube points over `dims` inputs with two smooth objectives.
fn training_set(n: usize, dims: usize) -> TrainingSet {
    let mut rng = fastrand::Rng::with_seed(42);
    let lower = vec![0.0; dims];
    let upper = vec![1.0; dims];
    let x = latin_hypercube(&mut rng, &lower, &upper, n);
    let y: Vec<Vec<f64>> = x
        .iter()
        .map(|p| {
            let s: f64 = p.iter().map(|v| v * v).sum();
            vec![s, p.iter().map(|v| (1.0 - v).powi(2)).sum::<f64>() + 0.1 * s.sin()]
        })
        .collect();
    let mut norm = Normalization::with_bounds(lower, upper).unwrap();
    norm.fit(&x, &y).unwrap();
    norm.training_set(&x, &y).unwrap()
}

fn bench_gp_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("gp_fit");
    group.sample_size(10);
    for n in [20, 50, 100] {
        let data = training_set(n, 4);
        group.bench_with_input(BenchmarkId::new("points", n), &data, |b, data| {
            b.iter(|| {
                let mut gp = GaussianProcess::builder().kernel(Kernel::Matern52).build();
                gp.fit(data, &mut fastrand::Rng::with_seed(0)).unwrap();
                gp
            });
        });
    }
    group.finish();
}

fn bench_gp_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("gp_evaluate");
    let data = training_set(50, 4);
    let mut gp = GaussianProcess::default();
    gp.fit(&data, &mut fastrand::Rng::with_seed(0)).unwrap();
    let queries = latin_hypercube(&mut fastrand::Rng::with_seed(1), &[0.0; 4], &[1.0; 4], 100);

    for (name, request) in [
        ("mean", EvalRequest::mean()),
        ("mean_std", EvalRequest::mean().with_std()),
        ("gradient", EvalRequest::mean().with_std().with_gradient()),
        ("hessian", EvalRequest::all()),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| gp.evaluate(&queries, request).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_gp_fit, bench_gp_evaluate);
criterion_main!(benches);

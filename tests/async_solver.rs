//! Parallel scalarized search. Only compiled with the `async` feature.

#![cfg(feature = "async")]

use std::sync::Arc;
use std::time::Duration;

use mobo_core::acquisition::{Acquisition, ExpectedImprovement, Identity};
use mobo_core::decomposition::das_dennis;
use mobo_core::design::{DesignSpace, ParamValue};
use mobo_core::normalization::Normalization;
use mobo_core::optimizer::{AlgorithmPreset, Mobo};
use mobo_core::problem::SimpleProblem;
use mobo_core::sampling::latin_hypercube;
use mobo_core::solver::ScalarizedSolver;
use mobo_core::surrogate::{GaussianProcess, SurrogateModel};
use mobo_core::types::Dataset;

fn fitted() -> (GaussianProcess, mobo_core::normalization::TrainingSet) {
    let mut rng = fastrand::Rng::with_seed(6);
    let x = latin_hypercube(&mut rng, &[0.0, 0.0], &[1.0, 1.0], 12);
    let y: Vec<Vec<f64>> = x.iter().map(|p| vec![p[0], 1.0 - p[0].sqrt() + p[1]]).collect();
    let mut norm = Normalization::with_bounds(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
    norm.fit(&x, &y).unwrap();
    let data = norm.training_set(&x, &y).unwrap();
    let mut gp = GaussianProcess::default();
    gp.fit(&data, &mut rng).unwrap();
    (gp, data)
}

#[tokio::test]
async fn test_one_candidate_per_weight() {
    let (gp, data) = fitted();
    let mut ei = ExpectedImprovement::default();
    ei.fit(&gp, &data, &mut fastrand::Rng::with_seed(0)).unwrap();

    let weights = das_dennis(2, 5);
    let starts = latin_hypercube(&mut fastrand::Rng::with_seed(1), &[0.0, 0.0], &[1.0, 1.0], 4);
    let solver = ScalarizedSolver::builder()
        .max_concurrency(3)
        .timeout(Duration::from_secs(30))
        .build();
    let out = solver
        .solve(Arc::new(gp), Arc::new(ei), starts, weights.clone())
        .await
        .unwrap();
    assert_eq!(out.len(), weights.len());
    assert!(out.families.is_none());
}

#[tokio::test]
async fn test_extreme_weights_favour_their_objective() {
    let (gp, _) = fitted();
    let surrogate: Arc<dyn SurrogateModel> = Arc::new(gp);
    let starts = vec![vec![0.5, 0.5]];
    let weights = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
    let out = ScalarizedSolver::default()
        .solve(Arc::clone(&surrogate), Arc::new(Identity), starts.clone(), weights)
        .await
        .unwrap();
    let start = Identity.evaluate(surrogate.as_ref(), &starts, false, false).unwrap().f;
    assert!(out.f[0][0] <= start[0][0] + 1e-9);
    assert!(out.f[1][1] <= start[0][1] + 1e-9);
}

#[tokio::test]
async fn test_empty_weights_rejected() {
    let (gp, _) = fitted();
    let result = ScalarizedSolver::default()
        .solve(Arc::new(gp), Arc::new(Identity), vec![vec![0.5, 0.5]], Vec::new())
        .await;
    assert!(matches!(result, Err(mobo_core::Error::InvalidConfig(_))));
}

#[test]
fn test_parego_round_uses_scalarized_runs() {
    let space = DesignSpace::continuous(2, 0.0, 1.0).unwrap();
    let mobo = Mobo::builder(SimpleProblem::new(space, 2))
        .preset(AlgorithmPreset::Parego)
        .batch_size(4)
        .pop_size(12)
        .seed(11)
        .build()
        .unwrap();

    let mut data = Dataset::default();
    for p in latin_hypercube(&mut fastrand::Rng::with_seed(2), &[0.0, 0.0], &[1.0, 1.0], 10) {
        let y = vec![p[0], 1.0 - p[0].sqrt() + p[1]];
        data.push(p.into_iter().map(ParamValue::Float).collect(), y).unwrap();
    }

    let proposal = mobo.propose(&data).unwrap();
    assert_eq!(proposal.x.len(), 4);
    for design in &proposal.x {
        assert!(design.iter().all(|v| matches!(v, ParamValue::Float(t) if (0.0..=1.0).contains(t))));
    }
}

use mobo_core::Error;
use mobo_core::surrogate::{
    BayesianNeuralNetwork, EvalRequest, Kernel, NeuralNetwork, SurrogateKind, SurrogateModel,
};

use crate::training_set;

#[test]
fn test_neural_network_has_no_std() {
    let data = training_set(20, 1);
    let mut nn = NeuralNetwork::builder().epochs(200).build();
    nn.fit(&data, &mut fastrand::Rng::with_seed(0)).unwrap();
    let x = vec![vec![0.2, 0.4, 0.6]];
    assert_eq!(nn.evaluate(&x, EvalRequest::mean()).unwrap().mean[0].len(), 2);
    assert!(matches!(
        nn.evaluate(&x, EvalRequest::mean().with_std()),
        Err(Error::UnsupportedConfiguration(_))
    ));
}

#[test]
fn test_ensemble_spread_and_gradient() {
    let data = training_set(20, 2);
    let mut bnn = BayesianNeuralNetwork::builder().ensemble_size(3).epochs(200).build();
    bnn.fit(&data, &mut fastrand::Rng::with_seed(1)).unwrap();
    let x = vec![0.3, 0.6, 0.45];
    let full = bnn
        .evaluate(&[x.clone()], EvalRequest::mean().with_std().with_gradient())
        .unwrap();
    assert!(full.std.unwrap()[0].iter().all(|s| *s >= 0.0));

    let grad = &full.mean_grad.unwrap()[0];
    let h = 1e-6;
    for k in 0..3 {
        let mut up = x.clone();
        let mut down = x.clone();
        up[k] += h;
        down[k] -= h;
        let mu = bnn.evaluate(&[up], EvalRequest::mean()).unwrap().mean;
        let md = bnn.evaluate(&[down], EvalRequest::mean()).unwrap().mean;
        for j in 0..2 {
            let numeric = (mu[0][j] - md[0][j]) / (2.0 * h);
            assert!((grad[(j, k)] - numeric).abs() < 1e-4 * (1.0 + numeric.abs()));
        }
    }
}

#[test]
fn test_unfitted_models_refuse_queries() {
    let x = vec![vec![0.5, 0.5, 0.5]];
    for kind in [
        SurrogateKind::GaussianProcess(Kernel::Matern32),
        SurrogateKind::NeuralNetwork,
        SurrogateKind::BayesianNeuralNetwork,
    ] {
        let model = kind.build();
        assert!(matches!(model.evaluate(&x, EvalRequest::mean()), Err(Error::NotFitted { .. })));
    }
}

#[test]
fn test_surrogate_kind_from_str() {
    assert_eq!(
        "gp-rbf".parse::<SurrogateKind>().unwrap(),
        SurrogateKind::GaussianProcess(Kernel::SquaredExponential)
    );
    assert!(matches!("svm".parse::<SurrogateKind>(), Err(Error::UnsupportedConfiguration(_))));
}

//! Ensemble ("Bayesian") neural-network surrogate.
//!
//! Each objective is modelled by `M` independently initialised networks.
//! With member outputs `f_m`:
//!
//! - `μ = mean(f_m)`
//! - `v = mean(f_m²) - μ²`
//! - `∇v = (2/M) Σ f_m ∇f_m - 2 μ ∇μ`
//! - `Hv = (2/M) Σ (∇f_m ∇f_mᵀ + f_m Hf_m) - 2 (∇μ ∇μᵀ + μ Hμ)`
//!
//! The std and its derivatives follow from the variance by the same chain
//! rule the Gaussian process uses.

use nalgebra::{DMatrix, DVector};

use super::mlp::{Mlp, TrainConfig};
use super::{EvalRequest, OutputEval, Prediction, SurrogateModel, assemble, check_inputs, std_from_variance};
use crate::error::{Error, Result};
use crate::normalization::{StandardScaler, TrainingSet};

const DEFAULT_ENSEMBLE_SIZE: usize = 5;

/// Ensemble of multilayer perceptrons per objective.
#[derive(Clone, Debug)]
pub struct BayesianNeuralNetwork {
    config: TrainConfig,
    ensemble_size: usize,
    fitted: Option<(Vec<Vec<Mlp>>, StandardScaler, usize)>,
}

impl Default for BayesianNeuralNetwork {
    fn default() -> Self {
        BayesianNeuralNetworkBuilder::new().build()
    }
}

/// Builder for [`BayesianNeuralNetwork`].
#[derive(Clone, Debug, Default)]
pub struct BayesianNeuralNetworkBuilder {
    config: TrainConfig,
    ensemble_size: Option<usize>,
}

impl BayesianNeuralNetworkBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Members per objective. Default: 5. Values below 2 are raised to 2.
    #[must_use]
    pub fn ensemble_size(mut self, n: usize) -> Self {
        self.ensemble_size = Some(n);
        self
    }

    /// Hidden layer widths. Default: `[32, 32]`.
    #[must_use]
    pub fn hidden_layers(mut self, widths: Vec<usize>) -> Self {
        self.config.hidden = widths;
        self
    }

    /// Full-batch training epochs per member. Default: 600.
    #[must_use]
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.config.epochs = epochs;
        self
    }

    /// Adam learning rate. Default: `1e-2`.
    #[must_use]
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.config.learning_rate = lr;
        self
    }

    /// Build the (unfitted) ensemble.
    #[must_use]
    pub fn build(self) -> BayesianNeuralNetwork {
        BayesianNeuralNetwork {
            config: self.config,
            ensemble_size: self.ensemble_size.unwrap_or(DEFAULT_ENSEMBLE_SIZE).max(2),
            fitted: None,
        }
    }
}

impl BayesianNeuralNetwork {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> BayesianNeuralNetworkBuilder {
        BayesianNeuralNetworkBuilder::new()
    }
}

#[allow(clippy::cast_precision_loss)]
fn ensemble_output(members: &[Mlp], x: &[f64], request: EvalRequest) -> OutputEval {
    let m = members.len() as f64;
    let need_derivatives = request.gradient || request.hessian;

    if !need_derivatives {
        let values: Vec<f64> = members.iter().map(|net| net.predict(x)).collect();
        let mean = values.iter().sum::<f64>() / m;
        let var = values.iter().map(|v| v * v).sum::<f64>() / m - mean * mean;
        return OutputEval {
            mean,
            std: request.std.then(|| var.max(0.0).sqrt()),
            ..OutputEval::default()
        };
    }

    let d = x.len();
    let mut mean = 0.0;
    let mut second = 0.0;
    let mut dmean = DVector::zeros(d);
    let mut dsecond = DVector::zeros(d);
    let mut hmean = DMatrix::zeros(d, d);
    let mut hsecond = DMatrix::zeros(d, d);
    for net in members {
        let der = net.derivatives(x, request.hessian);
        mean += der.value / m;
        second += der.value * der.value / m;
        dmean += &der.gradient / m;
        dsecond += &der.gradient * (2.0 * der.value / m);
        if let Some(h) = &der.hessian {
            hmean += h / m;
            hsecond += (&der.gradient * der.gradient.transpose() + h * der.value) * (2.0 / m);
        }
    }

    let mut eval = OutputEval {
        mean,
        mean_grad: request.gradient.then(|| dmean.clone()),
        mean_hess: request.hessian.then(|| hmean.clone()),
        ..OutputEval::default()
    };
    if request.std {
        let var = second - mean * mean;
        let dvar = dsecond - &dmean * (2.0 * mean);
        let hvar = request
            .hessian
            .then(|| hsecond - (&dmean * dmean.transpose() + &hmean * mean) * 2.0);
        let (s, ds, hs) = std_from_variance(var, Some(&dvar), hvar.as_ref());
        eval.std = Some(s);
        eval.std_grad = ds.filter(|_| request.gradient);
        eval.std_hess = hs;
    }
    eval
}

impl SurrogateModel for BayesianNeuralNetwork {
    fn fit(&mut self, data: &TrainingSet, rng: &mut fastrand::Rng) -> Result<()> {
        if data.is_empty() {
            return Err(Error::EmptyDataset);
        }
        let mut ensembles = Vec::with_capacity(data.n_obj());
        for j in 0..data.n_obj() {
            let y = data.y_column(j);
            let members: Vec<Mlp> = (0..self.ensemble_size)
                .map(|_| {
                    let mut net = Mlp::new(rng, data.n_var(), &self.config.hidden);
                    net.train(&data.x, &y, &self.config);
                    net
                })
                .collect();
            ensembles.push(members);
        }
        trace_info!(
            n_points = data.len(),
            n_obj = data.n_obj(),
            ensemble_size = self.ensemble_size,
            "bayesian neural network fitted"
        );
        self.fitted = Some((ensembles, data.y_scaler.clone(), data.n_var()));
        Ok(())
    }

    fn evaluate(&self, x: &[Vec<f64>], request: EvalRequest) -> Result<Prediction> {
        let (ensembles, scaler, n_var) = self.fitted.as_ref().ok_or(Error::NotFitted {
            component: "bayesian neural network",
        })?;
        check_inputs(x, *n_var)?;
        let evals = x
            .iter()
            .map(|xq| {
                ensembles
                    .iter()
                    .map(|members| ensemble_output(members, xq, request))
                    .collect()
            })
            .collect();
        assemble(evals, request, *n_var, scaler)
    }

    fn n_var(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.2)
    }

    fn n_obj(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.0.len())
    }
}

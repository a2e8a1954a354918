//! Deterministic neural-network surrogate.

use super::mlp::{Mlp, TrainConfig};
use super::{EvalRequest, OutputEval, Prediction, SurrogateModel, assemble, check_inputs};
use crate::error::{Error, Result};
use crate::normalization::{StandardScaler, TrainingSet};

/// One multilayer perceptron per objective, trained on squared error.
///
/// Predicts the mean with exact gradients and Hessians. It has no notion
/// of uncertainty: requesting `std` fails with
/// [`Error::UnsupportedConfiguration`].
#[derive(Clone, Debug, Default)]
pub struct NeuralNetwork {
    config: TrainConfig,
    fitted: Option<(Vec<Mlp>, StandardScaler, usize)>,
}

/// Builder for [`NeuralNetwork`].
#[derive(Clone, Debug, Default)]
pub struct NeuralNetworkBuilder {
    config: TrainConfig,
}

impl NeuralNetworkBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hidden layer widths. Default: `[32, 32]`.
    #[must_use]
    pub fn hidden_layers(mut self, widths: Vec<usize>) -> Self {
        self.config.hidden = widths;
        self
    }

    /// Full-batch training epochs. Default: 600.
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

    /// Build the (unfitted) network.
    #[must_use]
    pub fn build(self) -> NeuralNetwork {
        NeuralNetwork {
            config: self.config,
            fitted: None,
        }
    }
}

impl NeuralNetwork {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> NeuralNetworkBuilder {
        NeuralNetworkBuilder::new()
    }
}

impl SurrogateModel for NeuralNetwork {
    fn fit(&mut self, data: &TrainingSet, rng: &mut fastrand::Rng) -> Result<()> {
        if data.is_empty() {
            return Err(Error::EmptyDataset);
        }
        let mut nets = Vec::with_capacity(data.n_obj());
        for j in 0..data.n_obj() {
            let mut net = Mlp::new(rng, data.n_var(), &self.config.hidden);
            let loss = net.train(&data.x, &data.y_column(j), &self.config);
            trace_debug!(objective = j, loss, "neural network trained");
            nets.push(net);
        }
        trace_info!(n_points = data.len(), n_obj = data.n_obj(), "neural network fitted");
        self.fitted = Some((nets, data.y_scaler.clone(), data.n_var()));
        Ok(())
    }

    fn evaluate(&self, x: &[Vec<f64>], request: EvalRequest) -> Result<Prediction> {
        let (nets, scaler, n_var) = self.fitted.as_ref().ok_or(Error::NotFitted {
            component: "neural network",
        })?;
        if request.std {
            return Err(Error::UnsupportedConfiguration(
                "neural network surrogate has no predictive std".into(),
            ));
        }
        check_inputs(x, *n_var)?;
        let need_derivatives = request.gradient || request.hessian;
        let evals = x
            .iter()
            .map(|xq| {
                nets.iter()
                    .map(|net| {
                        if need_derivatives {
                            let der = net.derivatives(xq, request.hessian);
                            OutputEval {
                                mean: der.value,
                                mean_grad: Some(der.gradient),
                                mean_hess: der.hessian,
                                ..OutputEval::default()
                            }
                        } else {
                            OutputEval {
                                mean: net.predict(xq),
                                ..OutputEval::default()
                            }
                        }
                    })
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

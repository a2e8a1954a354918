//! Confidence-bound acquisition.

use super::{Acquisition, AcquisitionValue, Transformed, map_prediction, surrogate_request};
use crate::error::{Error, Result};
use crate::normalization::TrainingSet;
use crate::surrogate::SurrogateModel;

/// `F = μ - λ s` with `λ = √(ln n / n)`, `n` the number of training points.
///
/// For minimized objectives this is the lower confidence bound; the name
/// follows the usual convention for the maximization form.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpperConfidenceBound {
    lambda: Option<f64>,
}

impl UpperConfidenceBound {
    /// The exploration weight fitted for `n` training points.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lambda_for(n: usize) -> f64 {
        let n = n as f64;
        if n <= 1.0 { 0.0 } else { (n.ln() / n).sqrt() }
    }

    /// The fitted exploration weight.
    #[must_use]
    pub fn lambda(&self) -> Option<f64> {
        self.lambda
    }
}

impl Acquisition for UpperConfidenceBound {
    fn fit(&mut self, _surrogate: &dyn SurrogateModel, data: &TrainingSet, _rng: &mut fastrand::Rng) -> Result<()> {
        if data.is_empty() {
            return Err(Error::EmptyDataset);
        }
        let lambda = Self::lambda_for(data.len());
        trace_debug!(lambda, "ucb fitted");
        self.lambda = Some(lambda);
        Ok(())
    }

    fn evaluate(
        &self,
        surrogate: &dyn SurrogateModel,
        x: &[Vec<f64>],
        gradient: bool,
        hessian: bool,
    ) -> Result<AcquisitionValue> {
        let lambda = self.lambda.ok_or(Error::NotFitted { component: "ucb" })?;
        let pred = surrogate.evaluate(x, surrogate_request(true, gradient, hessian))?;
        Ok(map_prediction(&pred, surrogate.n_var(), gradient, hessian, |_, l| Transformed {
            f: l.mean - lambda * l.std,
            df: gradient.then(|| &l.dmean - &l.dstd * lambda),
            hf: hessian.then(|| &l.hmean - &l.hstd * lambda),
        }))
    }
}

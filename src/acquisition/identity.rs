//! Posterior mean as acquisition.

use super::{Acquisition, AcquisitionValue, Transformed, map_prediction, surrogate_request};
use crate::error::Result;
use crate::normalization::TrainingSet;
use crate::surrogate::SurrogateModel;

/// Pass the surrogate mean through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Acquisition for Identity {
    fn fit(&mut self, _surrogate: &dyn SurrogateModel, _data: &TrainingSet, _rng: &mut fastrand::Rng) -> Result<()> {
        Ok(())
    }

    fn evaluate(
        &self,
        surrogate: &dyn SurrogateModel,
        x: &[Vec<f64>],
        gradient: bool,
        hessian: bool,
    ) -> Result<AcquisitionValue> {
        let pred = surrogate.evaluate(x, surrogate_request(false, gradient, hessian))?;
        Ok(map_prediction(&pred, surrogate.n_var(), gradient, hessian, |_, l| Transformed {
            f: l.mean,
            df: gradient.then(|| l.dmean.clone()),
            hf: hessian.then(|| l.hmean.clone()),
        }))
    }

    fn requires_std(&self) -> bool {
        false
    }
}

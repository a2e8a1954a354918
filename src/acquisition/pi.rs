//! Probability of improvement.

use super::{Acquisition, AcquisitionValue, Transformed, best_observed, map_prediction, norm_cdf, norm_pdf, surrogate_request};
use crate::error::{Error, Result};
use crate::normalization::TrainingSet;
use crate::surrogate::{SurrogateModel, safe_divide};

/// Negated probability of improving on the best observed value.
///
/// With `z = (y_min - μ) / s`, `F = -Φ(z)`. The derivatives of `z` are
///
/// - `∇z = -(∇μ + z ∇s) / s`
/// - `Hz = -(Hμ + z Hs + ∇s ∇zᵀ + ∇z ∇sᵀ) / s`
///
/// and `∇F = -φ ∇z`, `HF = z φ ∇z ∇zᵀ - φ Hz`.
#[derive(Clone, Debug, Default)]
pub struct ProbabilityOfImprovement {
    y_min: Option<Vec<f64>>,
}

impl ProbabilityOfImprovement {
    /// Per-objective best observed values from the last fit.
    #[must_use]
    pub fn best(&self) -> Option<&[f64]> {
        self.y_min.as_deref()
    }
}

impl Acquisition for ProbabilityOfImprovement {
    fn fit(&mut self, _surrogate: &dyn SurrogateModel, data: &TrainingSet, _rng: &mut fastrand::Rng) -> Result<()> {
        let y_min = best_observed(data)?;
        trace_debug!(?y_min, "probability of improvement fitted");
        self.y_min = Some(y_min);
        Ok(())
    }

    fn evaluate(
        &self,
        surrogate: &dyn SurrogateModel,
        x: &[Vec<f64>],
        gradient: bool,
        hessian: bool,
    ) -> Result<AcquisitionValue> {
        let y_min = self.y_min.as_ref().ok_or(Error::NotFitted {
            component: "probability of improvement",
        })?;
        let pred = surrogate.evaluate(x, surrogate_request(true, gradient, hessian))?;
        Ok(map_prediction(&pred, surrogate.n_var(), gradient, hessian, |j, l| {
            let inv_s = safe_divide(1.0, l.std);
            let z = (y_min[j] - l.mean) * inv_s;
            let pdf = norm_pdf(z);
            let dz = (gradient || hessian).then(|| -(&l.dmean + &l.dstd * z) * inv_s);
            let hf = match (&dz, hessian) {
                (Some(dz), true) => {
                    let hz = -(&l.hmean + &l.hstd * z + &l.dstd * dz.transpose() + dz * l.dstd.transpose()) * inv_s;
                    Some(dz * dz.transpose() * (z * pdf) - hz * pdf)
                }
                _ => None,
            };
            Transformed {
                f: -norm_cdf(z),
                df: dz.map(|dz| dz * -pdf),
                hf,
            }
        }))
    }
}

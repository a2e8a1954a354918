//! Expected improvement.

use nalgebra::{DMatrix, DVector};

use super::{Acquisition, AcquisitionValue, Transformed, best_observed, map_prediction, norm_cdf, norm_pdf, surrogate_request};
use crate::error::{Error, Result};
use crate::normalization::TrainingSet;
use crate::surrogate::SurrogateModel;

/// Negated expected improvement over the best observed value.
///
/// With `z = (y_min - μ) / s`:
///
/// - `F = -(y_min - μ) Φ(z) - s φ(z)`
/// - `∇F = Φ ∇μ - φ ∇s`
/// - `HF = Φ Hμ - φ Hs - (φ / s) (∇μ + z ∇s)(∇μ + z ∇s)ᵀ`
///
/// A point with `s = 0` has no expected improvement: it contributes `0`
/// with zero derivatives.
#[derive(Clone, Debug, Default)]
pub struct ExpectedImprovement {
    y_min: Option<Vec<f64>>,
}

impl ExpectedImprovement {
    /// Per-objective best observed values from the last fit.
    #[must_use]
    pub fn best(&self) -> Option<&[f64]> {
        self.y_min.as_deref()
    }
}

impl Acquisition for ExpectedImprovement {
    fn fit(&mut self, _surrogate: &dyn SurrogateModel, data: &TrainingSet, _rng: &mut fastrand::Rng) -> Result<()> {
        let y_min = best_observed(data)?;
        trace_debug!(?y_min, "expected improvement fitted");
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
            component: "expected improvement",
        })?;
        let pred = surrogate.evaluate(x, surrogate_request(true, gradient, hessian))?;
        let n_var = surrogate.n_var();
        Ok(map_prediction(&pred, n_var, gradient, hessian, |j, l| {
            if l.std <= 0.0 {
                return Transformed {
                    f: 0.0,
                    df: (gradient || hessian).then(|| DVector::zeros(n_var)),
                    hf: hessian.then(|| DMatrix::zeros(n_var, n_var)),
                };
            }
            let improvement = y_min[j] - l.mean;
            let z = improvement / l.std;
            let cdf = norm_cdf(z);
            let pdf = norm_pdf(z);
            let df = (gradient || hessian).then(|| &l.dmean * cdf - &l.dstd * pdf);
            let hf = hessian.then(|| {
                let v = &l.dmean + &l.dstd * z;
                &l.hmean * cdf - &l.hstd * pdf - &v * v.transpose() * (pdf / l.std)
            });
            Transformed {
                f: -improvement * cdf - l.std * pdf,
                df,
                hf,
            }
        }))
    }
}

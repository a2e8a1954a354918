//! Acquisition functions: scalar signals derived from surrogate predictions.
//!
//! Every acquisition is fitted once per round (after the surrogate) and then
//! evaluated at normalized designs, returning one value per objective. All
//! values follow a "lower is better" convention, so improvement-based
//! criteria are negated.
//!
//! | Acquisition | `F` per objective |
//! |---|---|
//! | [`Identity`] | `μ` |
//! | [`ExpectedImprovement`] | `-EI(μ, s; y_min)` |
//! | [`ProbabilityOfImprovement`] | `-Φ((y_min - μ) / s)` |
//! | [`UpperConfidenceBound`] | `μ - λ s`, `λ = √(ln n / n)` |
//! | [`ThompsonSampling`] | random-feature posterior sample |
//! | [`LocalPenalization`] | base acquisition with exclusion zones around busy points |
//!
//! Derivatives follow from the surrogate's `(∇μ, ∇s, Hμ, Hs)` by the chain
//! rule.

mod ei;
mod identity;
mod penalized;
mod pi;
mod thompson;
mod ucb;

use core::str::FromStr;

use nalgebra::{DMatrix, DVector};

pub use ei::ExpectedImprovement;
pub use identity::Identity;
pub use penalized::{LipschitzMode, LocalPenalization};
pub use pi::ProbabilityOfImprovement;
pub use thompson::ThompsonSampling;
pub use ucb::UpperConfidenceBound;

use crate::error::{Error, Result};
use crate::normalization::TrainingSet;
use crate::surrogate::{EvalRequest, Prediction, SurrogateModel};

/// Acquisition values for a batch of points.
///
/// `f` is `n_points × n_obj`. Gradients are `n_obj × n_var` per point;
/// Hessians are one `n_var × n_var` matrix per objective per point.
#[derive(Clone, Debug, Default)]
pub struct AcquisitionValue {
    /// Values.
    pub f: Vec<Vec<f64>>,
    /// Gradients, when requested.
    pub df: Option<Vec<DMatrix<f64>>>,
    /// Hessians, when requested.
    pub hf: Option<Vec<Vec<DMatrix<f64>>>>,
}

/// Contract shared by every acquisition function.
pub trait Acquisition: Send + Sync {
    /// Fit per-round state. The surrogate must already be fitted on `data`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyDataset` for empty data and
    /// `Error::UnsupportedConfiguration` when the surrogate is of the wrong
    /// kind.
    fn fit(&mut self, surrogate: &dyn SurrogateModel, data: &TrainingSet, rng: &mut fastrand::Rng) -> Result<()>;

    /// Evaluate at normalized designs.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit), surrogate
    /// errors, and `Error::NotImplemented` for unavailable derivatives.
    fn evaluate(
        &self,
        surrogate: &dyn SurrogateModel,
        x: &[Vec<f64>],
        gradient: bool,
        hessian: bool,
    ) -> Result<AcquisitionValue>;

    /// Whether evaluation needs the surrogate's predictive std.
    fn requires_std(&self) -> bool {
        true
    }
}

/// Acquisition selected by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AcquisitionKind {
    /// Posterior mean.
    #[default]
    Identity,
    /// Expected improvement.
    ExpectedImprovement,
    /// Probability of improvement.
    ProbabilityOfImprovement,
    /// Lower confidence bound on the minimized objective.
    UpperConfidenceBound,
    /// Thompson sampling (Gaussian process surrogate only).
    ThompsonSampling,
}

impl FromStr for AcquisitionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "identity" => Ok(Self::Identity),
            "ei" => Ok(Self::ExpectedImprovement),
            "pi" => Ok(Self::ProbabilityOfImprovement),
            "ucb" => Ok(Self::UpperConfidenceBound),
            "ts" => Ok(Self::ThompsonSampling),
            other => Err(Error::UnsupportedConfiguration(format!(
                "unknown acquisition '{other}'"
            ))),
        }
    }
}

impl AcquisitionKind {
    /// An acquisition of this kind with default settings.
    #[must_use]
    pub fn build(self) -> Box<dyn Acquisition> {
        match self {
            Self::Identity => Box::new(Identity),
            Self::ExpectedImprovement => Box::new(ExpectedImprovement::default()),
            Self::ProbabilityOfImprovement => Box::new(ProbabilityOfImprovement::default()),
            Self::UpperConfidenceBound => Box::new(UpperConfidenceBound::default()),
            Self::ThompsonSampling => Box::new(ThompsonSampling::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Normal distribution helpers
// ---------------------------------------------------------------------------

/// Standard normal PDF.
pub(crate) fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF via the complementary error function.
pub(crate) fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x * core::f64::consts::FRAC_1_SQRT_2)
}

/// Complementary error function (Numerical Recipes `erfcc`, relative error
/// below `1.2e-7` everywhere).
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98 + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let r = t * poly.exp();
    if x >= 0.0 { r } else { 2.0 - r }
}

// ---------------------------------------------------------------------------
// Chain-rule plumbing
// ---------------------------------------------------------------------------

/// One objective's surrogate output at one point.
pub(crate) struct Local {
    pub(crate) mean: f64,
    pub(crate) std: f64,
    pub(crate) dmean: DVector<f64>,
    pub(crate) dstd: DVector<f64>,
    pub(crate) hmean: DMatrix<f64>,
    pub(crate) hstd: DMatrix<f64>,
}

/// Transformed value with optional derivatives.
pub(crate) struct Transformed {
    pub(crate) f: f64,
    pub(crate) df: Option<DVector<f64>>,
    pub(crate) hf: Option<DMatrix<f64>>,
}

pub(crate) fn surrogate_request(needs_std: bool, gradient: bool, hessian: bool) -> EvalRequest {
    EvalRequest {
        std: needs_std,
        gradient: gradient || hessian,
        hessian,
    }
}

/// Apply a per-objective transform to every entry of a prediction.
///
/// The transform receives the objective index and that objective's local
/// surrogate output.
pub(crate) fn map_prediction<F>(
    pred: &Prediction,
    n_var: usize,
    gradient: bool,
    hessian: bool,
    transform: F,
) -> AcquisitionValue
where
    F: Fn(usize, &Local) -> Transformed,
{
    let n_obj = pred.mean.first().map_or(0, Vec::len);
    let mut f = Vec::with_capacity(pred.len());
    let mut df = Vec::with_capacity(if gradient { pred.len() } else { 0 });
    let mut hf = Vec::with_capacity(if hessian { pred.len() } else { 0 });

    for i in 0..pred.len() {
        let mut row = Vec::with_capacity(n_obj);
        let mut grad = DMatrix::zeros(n_obj, n_var);
        let mut hess = Vec::with_capacity(n_obj);
        for j in 0..n_obj {
            let local = Local {
                mean: pred.mean[i][j],
                std: pred.std.as_ref().map_or(0.0, |s| s[i][j]),
                dmean: row_of(pred.mean_grad.as_ref(), i, j, n_var),
                dstd: row_of(pred.std_grad.as_ref(), i, j, n_var),
                hmean: hess_of(pred.mean_hess.as_ref(), i, j, n_var),
                hstd: hess_of(pred.std_hess.as_ref(), i, j, n_var),
            };
            let out = transform(j, &local);
            row.push(out.f);
            if gradient && let Some(g) = &out.df {
                grad.row_mut(j).copy_from(&g.transpose());
            }
            if hessian {
                hess.push(out.hf.unwrap_or_else(|| DMatrix::zeros(n_var, n_var)));
            }
        }
        f.push(row);
        if gradient {
            df.push(grad);
        }
        if hessian {
            hf.push(hess);
        }
    }

    AcquisitionValue {
        f,
        df: gradient.then_some(df),
        hf: hessian.then_some(hf),
    }
}

fn row_of(m: Option<&Vec<DMatrix<f64>>>, i: usize, j: usize, n_var: usize) -> DVector<f64> {
    m.map_or_else(|| DVector::zeros(n_var), |m| m[i].row(j).transpose())
}

fn hess_of(m: Option<&Vec<Vec<DMatrix<f64>>>>, i: usize, j: usize, n_var: usize) -> DMatrix<f64> {
    m.map_or_else(|| DMatrix::zeros(n_var, n_var), |m| m[i][j].clone())
}

/// Per-objective minimum of the raw training targets.
pub(crate) fn best_observed(data: &TrainingSet) -> Result<Vec<f64>> {
    if data.is_empty() {
        return Err(Error::EmptyDataset);
    }
    let raw = data.y_raw()?;
    let n_obj = data.n_obj();
    Ok((0..n_obj)
        .map(|j| raw.iter().map(|r| r[j]).fold(f64::INFINITY, f64::min))
        .collect())
}

#[cfg(test)]
pub(crate) mod test_support {
    use nalgebra::DMatrix;

    use crate::error::Result;
    use crate::normalization::{Normalization, TrainingSet};
    use crate::surrogate::{EvalRequest, GaussianProcess, Prediction, SurrogateModel};

    /// One-variable, one-objective surrogate with the same mean and std
    /// everywhere.
    pub(crate) struct Flat {
        pub(crate) mean: f64,
        pub(crate) std: f64,
    }

    impl SurrogateModel for Flat {
        fn fit(&mut self, _data: &TrainingSet, _rng: &mut fastrand::Rng) -> Result<()> {
            Ok(())
        }

        fn evaluate(&self, x: &[Vec<f64>], request: EvalRequest) -> Result<Prediction> {
            let n = x.len();
            Ok(Prediction {
                mean: vec![vec![self.mean]; n],
                std: request.std.then(|| vec![vec![self.std]; n]),
                mean_grad: request.gradient.then(|| vec![DMatrix::zeros(1, 1); n]),
                std_grad: request.gradient.then(|| vec![DMatrix::zeros(1, 1); n]),
                mean_hess: request.hessian.then(|| vec![vec![DMatrix::zeros(1, 1)]; n]),
                std_hess: request.hessian.then(|| vec![vec![DMatrix::zeros(1, 1)]; n]),
            })
        }

        fn n_var(&self) -> usize {
            1
        }

        fn n_obj(&self) -> usize {
            1
        }
    }

    /// Two one-dimensional samples with targets `1` and `2`.
    pub(crate) fn two_point_data() -> TrainingSet {
        let x = vec![vec![0.0], vec![1.0]];
        let y = vec![vec![1.0], vec![2.0]];
        let mut norm = Normalization::new();
        norm.fit(&x, &y).unwrap();
        norm.training_set(&x, &y).unwrap()
    }

    /// A small two-objective problem fitted with a default Gaussian process.
    pub(crate) fn fitted_gp() -> (GaussianProcess, TrainingSet) {
        let x: Vec<Vec<f64>> = (0..10)
            .map(|i| {
                let t = f64::from(i) / 9.0;
                vec![t, (0.37 + 0.61 * t * 7.0).fract()]
            })
            .collect();
        let y: Vec<Vec<f64>> = x
            .iter()
            .map(|p| vec![(p[0] - 0.3).powi(2) + 0.5 * p[1], (p[0] - 0.8).powi(2) + (p[1] - 0.5).powi(2)])
            .collect();
        let mut norm = Normalization::new();
        norm.fit(&x, &y).unwrap();
        let data = norm.training_set(&x, &y).unwrap();
        let mut gp = GaussianProcess::default();
        gp.fit(&data, &mut fastrand::Rng::with_seed(21)).unwrap();
        (gp, data)
    }

    /// Central-difference check of `df` and `hf` for objective `j`.
    pub(crate) fn check_derivatives(
        acq: &dyn super::Acquisition,
        surrogate: &dyn SurrogateModel,
        x: &[f64],
        tol: f64,
    ) {
        let full = acq.evaluate(surrogate, &[x.to_vec()], true, true).unwrap();
        let df = &full.df.unwrap()[0];
        let hf = &full.hf.unwrap()[0];
        let n_obj = full.f[0].len();
        let eps = 1e-5;
        for k in 0..x.len() {
            let mut xp = x.to_vec();
            let mut xm = x.to_vec();
            xp[k] += eps;
            xm[k] -= eps;
            let up = acq.evaluate(surrogate, &[xp], true, false).unwrap();
            let down = acq.evaluate(surrogate, &[xm], true, false).unwrap();
            let gu = &up.df.unwrap()[0];
            let gd = &down.df.unwrap()[0];
            for j in 0..n_obj {
                let fd = (up.f[0][j] - down.f[0][j]) / (2.0 * eps);
                assert!(
                    (df[(j, k)] - fd).abs() < tol * fd.abs().max(1.0),
                    "gradient obj {j} dim {k}: {} vs {fd}",
                    df[(j, k)]
                );
                for l in 0..x.len() {
                    let fd2 = (gu[(j, l)] - gd[(j, l)]) / (2.0 * eps);
                    assert!(
                        (hf[j][(l, k)] - fd2).abs() < tol * fd2.abs().max(1.0),
                        "hessian obj {j} ({l},{k}): {} vs {fd2}",
                        hf[j][(l, k)]
                    );
                }
            }
        }
    }
}

//! Probabilistic surrogate models of the objective functions.
//!
//! A surrogate fits one regressor per objective on a normalized
//! [`TrainingSet`] and answers queries at normalized designs. Every
//! [`Prediction`] it returns is expressed in raw objective units: the mean
//! goes through the inverse affine transform, while std and all derivatives
//! are only multiplied by the objective's scale.
//!
//! | Model | Std | Derivatives |
//! |---|---|---|
//! | [`GaussianProcess`] | posterior std | analytic |
//! | [`NeuralNetwork`] | not supported | analytic (forward mode) |
//! | [`BayesianNeuralNetwork`] | ensemble spread | analytic |
//!
//! # Example
//!
//! ```
//! use mobo_core::normalization::Normalization;
//! use mobo_core::surrogate::{EvalRequest, GaussianProcess, SurrogateModel};
//!
//! let x = vec![vec![0.0], vec![0.5], vec![1.0]];
//! let y = vec![vec![1.0], vec![0.0], vec![1.0]];
//! let mut norm = Normalization::new();
//! norm.fit(&x, &y).unwrap();
//! let data = norm.training_set(&x, &y).unwrap();
//!
//! let mut gp = GaussianProcess::default();
//! let mut rng = fastrand::Rng::with_seed(0);
//! gp.fit(&data, &mut rng).unwrap();
//!
//! let pred = gp.evaluate(&[vec![0.5]], EvalRequest::mean().with_std()).unwrap();
//! assert!((pred.mean[0][0] - 0.0).abs() < 1e-2);
//! ```

mod bnn;
pub mod gp;
pub mod kernel;
mod mlp;
mod nn;

use core::str::FromStr;

use nalgebra::{DMatrix, DVector};

pub use bnn::{BayesianNeuralNetwork, BayesianNeuralNetworkBuilder};
pub use gp::{GaussianProcess, GaussianProcessBuilder, GpHyperparameters};
pub use kernel::{Kernel, KernelParams};
pub use nn::{NeuralNetwork, NeuralNetworkBuilder};

use crate::error::{Error, Result};
use crate::normalization::{StandardScaler, TrainingSet};

/// Divide `a` by `b`, returning `0` where `b` is exactly zero.
///
/// Degenerate quantities (zero std, coincident points) are expected during
/// normal operation and must not produce `NaN` or `∞`.
#[inline]
#[must_use]
pub fn safe_divide(a: f64, b: f64) -> f64 {
    if b == 0.0 { 0.0 } else { a / b }
}

/// Which quantities an evaluation should compute besides the mean.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalRequest {
    /// Compute the predictive standard deviation.
    pub std: bool,
    /// Compute gradients with respect to the design.
    pub gradient: bool,
    /// Compute Hessians with respect to the design.
    pub hessian: bool,
}

impl EvalRequest {
    /// Mean only.
    #[must_use]
    pub fn mean() -> Self {
        Self::default()
    }

    /// Everything: std, gradients, and Hessians.
    #[must_use]
    pub fn all() -> Self {
        Self {
            std: true,
            gradient: true,
            hessian: true,
        }
    }

    /// Also compute the standard deviation.
    #[must_use]
    pub fn with_std(mut self) -> Self {
        self.std = true;
        self
    }

    /// Also compute gradients.
    #[must_use]
    pub fn with_gradient(mut self) -> Self {
        self.gradient = true;
        self
    }

    /// Also compute Hessians.
    #[must_use]
    pub fn with_hessian(mut self) -> Self {
        self.hessian = true;
        self
    }
}

/// Surrogate output for a batch of query points, in raw objective units.
///
/// Outer vectors are indexed by query point. Gradients are `n_obj × n_var`
/// matrices; Hessians are one `n_var × n_var` matrix per objective.
#[derive(Clone, Debug, Default)]
pub struct Prediction {
    /// Predictive means, `n_points × n_obj`.
    pub mean: Vec<Vec<f64>>,
    /// Predictive standard deviations, `n_points × n_obj`.
    pub std: Option<Vec<Vec<f64>>>,
    /// Mean gradients.
    pub mean_grad: Option<Vec<DMatrix<f64>>>,
    /// Std gradients.
    pub std_grad: Option<Vec<DMatrix<f64>>>,
    /// Mean Hessians.
    pub mean_hess: Option<Vec<Vec<DMatrix<f64>>>>,
    /// Std Hessians.
    pub std_hess: Option<Vec<Vec<DMatrix<f64>>>>,
}

impl Prediction {
    /// Number of query points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    /// Returns `true` if no points were evaluated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub(crate) fn require_std(&self) -> Result<&[Vec<f64>]> {
        self.std.as_deref().ok_or(Error::NotImplemented("surrogate std"))
    }
}

/// Contract shared by every surrogate model.
pub trait SurrogateModel: Send + Sync {
    /// Fit the model to normalized training data.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyDataset` for empty data, or a numerical error if
    /// fitting breaks down.
    fn fit(&mut self, data: &TrainingSet, rng: &mut fastrand::Rng) -> Result<()>;

    /// Evaluate at normalized designs.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit),
    /// `Error::DimensionMismatch` for wrongly sized inputs, and
    /// `Error::UnsupportedConfiguration` when the model cannot produce a
    /// requested quantity.
    fn evaluate(&self, x: &[Vec<f64>], request: EvalRequest) -> Result<Prediction>;

    /// Input dimensionality seen during fit (0 before).
    fn n_var(&self) -> usize;

    /// Number of objectives seen during fit (0 before).
    fn n_obj(&self) -> usize;

    /// Downcast to a Gaussian process, for consumers that need its
    /// internals (Thompson sampling).
    fn as_gaussian_process(&self) -> Option<&GaussianProcess> {
        None
    }
}

/// Surrogate family selected by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SurrogateKind {
    /// Gaussian process with the given kernel.
    GaussianProcess(Kernel),
    /// Deterministic neural network.
    NeuralNetwork,
    /// Ensemble neural network.
    BayesianNeuralNetwork,
}

impl Default for SurrogateKind {
    fn default() -> Self {
        Self::GaussianProcess(Kernel::default())
    }
}

impl FromStr for SurrogateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gp" => Ok(Self::GaussianProcess(Kernel::default())),
            "nn" => Ok(Self::NeuralNetwork),
            "bnn" => Ok(Self::BayesianNeuralNetwork),
            other => match other.strip_prefix("gp-") {
                Some(kernel) => Ok(Self::GaussianProcess(kernel.parse()?)),
                None => Err(Error::UnsupportedConfiguration(format!(
                    "unknown surrogate '{other}'"
                ))),
            },
        }
    }
}

impl SurrogateKind {
    /// A model of this kind with default settings.
    #[must_use]
    pub fn build(self) -> Box<dyn SurrogateModel> {
        match self {
            Self::GaussianProcess(kernel) => Box::new(GaussianProcess::builder().kernel(kernel).build()),
            Self::NeuralNetwork => Box::new(NeuralNetwork::default()),
            Self::BayesianNeuralNetwork => Box::new(BayesianNeuralNetwork::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared evaluation plumbing
// ---------------------------------------------------------------------------

/// One objective's prediction at one point, in normalized units.
#[derive(Clone, Debug, Default)]
pub(crate) struct OutputEval {
    pub(crate) mean: f64,
    pub(crate) std: Option<f64>,
    pub(crate) mean_grad: Option<DVector<f64>>,
    pub(crate) std_grad: Option<DVector<f64>>,
    pub(crate) mean_hess: Option<DMatrix<f64>>,
    pub(crate) std_hess: Option<DMatrix<f64>>,
}

/// Standard deviation and its derivatives from a variance and its
/// derivatives.
///
/// `s = √max(v, 0)`, `∇s = ∇v / 2s` and
/// `Hs = Hv / 2s - ∇v ∇vᵀ / 4s³`, each division guarded.
pub(crate) fn std_from_variance(
    var: f64,
    dvar: Option<&DVector<f64>>,
    hvar: Option<&DMatrix<f64>>,
) -> (f64, Option<DVector<f64>>, Option<DMatrix<f64>>) {
    let s = var.max(0.0).sqrt();
    let inv_2s = safe_divide(1.0, 2.0 * s);
    let ds = dvar.map(|dv| dv * inv_2s);
    let hs = match (dvar, hvar) {
        (Some(dv), Some(hv)) => {
            let inv_4s3 = safe_divide(1.0, 4.0 * s * s * s);
            Some(hv * inv_2s - dv * dv.transpose() * inv_4s3)
        }
        _ => None,
    };
    (s, ds, hs)
}

pub(crate) fn check_inputs(x: &[Vec<f64>], n_var: usize) -> Result<()> {
    for row in x {
        crate::error::check_dim("query width", n_var, row.len())?;
    }
    Ok(())
}

/// Pack per-point, per-objective evaluations into a raw-unit [`Prediction`].
pub(crate) fn assemble(
    evals: Vec<Vec<OutputEval>>,
    request: EvalRequest,
    n_var: usize,
    y_scaler: &StandardScaler,
) -> Result<Prediction> {
    let n_obj = evals.first().map_or(0, Vec::len);
    let factors: Vec<f64> = (0..n_obj).map(|j| y_scaler.factor(j)).collect::<Result<_>>()?;

    let means: Vec<Vec<f64>> = evals.iter().map(|row| row.iter().map(|e| e.mean).collect()).collect();
    let mean = y_scaler.inverse_transform(&means)?;

    let std: Option<Vec<Vec<f64>>> = request.std.then(|| {
        evals
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&factors)
                    .map(|(e, s)| e.std.unwrap_or(0.0) * s)
                    .collect()
            })
            .collect()
    });

    let grad_matrix = |pick: fn(&OutputEval) -> Option<&DVector<f64>>| -> Vec<DMatrix<f64>> {
        evals
            .iter()
            .map(|row| {
                let mut m = DMatrix::zeros(n_obj, n_var);
                for (j, (e, s)) in row.iter().zip(&factors).enumerate() {
                    if let Some(g) = pick(e) {
                        m.row_mut(j).copy_from(&(g.transpose() * *s));
                    }
                }
                m
            })
            .collect()
    };
    let hess_list = |pick: fn(&OutputEval) -> Option<&DMatrix<f64>>| -> Vec<Vec<DMatrix<f64>>> {
        evals
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&factors)
                    .map(|(e, s)| pick(e).map_or_else(|| DMatrix::zeros(n_var, n_var), |h| h * *s))
                    .collect()
            })
            .collect()
    };

    let mean_grad = request.gradient.then(|| grad_matrix(|e| e.mean_grad.as_ref()));
    let std_grad = (request.gradient && request.std).then(|| grad_matrix(|e| e.std_grad.as_ref()));
    let mean_hess = request.hessian.then(|| hess_list(|e| e.mean_hess.as_ref()));
    let std_hess = (request.hessian && request.std).then(|| hess_list(|e| e.std_hess.as_ref()));

    Ok(Prediction {
        mean,
        std,
        mean_grad,
        std_grad,
        mean_hess,
        std_hess,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_divide() {
        assert!(safe_divide(3.0, 0.0).abs() < f64::EPSILON);
        assert!(safe_divide(-1.0, 0.0).abs() < f64::EPSILON);
        assert!((safe_divide(3.0, 2.0) - 1.5).abs() < f64::EPSILON);
        assert!((safe_divide(1.0, -4.0) + 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_std_chain_rule_matches_finite_difference() {
        // v(x) = 1 + x0² + x0 x1
        let var = |x: &[f64]| 1.0 + x[0] * x[0] + x[0] * x[1];
        let x = [0.3, -0.7];
        let dv = DVector::from_vec(vec![2.0 * x[0] + x[1], x[0]]);
        let hv = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 0.0]);
        let (s, ds, hs) = std_from_variance(var(&x), Some(&dv), Some(&hv));
        assert!((s - var(&x).sqrt()).abs() < 1e-14);

        let eps = 1e-5;
        let ds = ds.unwrap();
        let hs = hs.unwrap();
        for j in 0..2 {
            let mut xp = x;
            let mut xm = x;
            xp[j] += eps;
            xm[j] -= eps;
            let fd = (var(&xp).sqrt() - var(&xm).sqrt()) / (2.0 * eps);
            assert!((ds[j] - fd).abs() < 1e-8);
            let fd2 = (var(&xp).sqrt() - 2.0 * s + var(&xm).sqrt()) / (eps * eps);
            assert!((hs[(j, j)] - fd2).abs() < 1e-4);
        }
    }

    #[test]
    fn test_std_from_zero_variance_is_finite() {
        let dv = DVector::from_vec(vec![1.0]);
        let hv = DMatrix::from_element(1, 1, 1.0);
        let (s, ds, hs) = std_from_variance(-1e-12, Some(&dv), Some(&hv));
        assert!(s.abs() < f64::EPSILON);
        assert!(ds.unwrap()[0].abs() < f64::EPSILON);
        assert!(hs.unwrap()[(0, 0)].abs() < f64::EPSILON);
    }

    #[test]
    fn test_surrogate_kind_from_str() {
        assert_eq!("bnn".parse::<SurrogateKind>().unwrap(), SurrogateKind::BayesianNeuralNetwork);
        assert_eq!(
            "gp-rbf".parse::<SurrogateKind>().unwrap(),
            SurrogateKind::GaussianProcess(Kernel::SquaredExponential)
        );
        assert!(matches!(
            "forest".parse::<SurrogateKind>(),
            Err(Error::UnsupportedConfiguration(_))
        ));
    }
}

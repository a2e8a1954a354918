//! Gaussian process regression, one independent process per objective.
//!
//! Hyperparameters (signal variance, ARD length scales, noise variance)
//! are fitted per objective by minimizing the negative log marginal
//! likelihood with [`lbfgs`](crate::optim::lbfgs) in log space, using
//! analytic gradients:
//!
//! `∂(-log p)/∂θ = -½ tr((ααᵀ - K⁻¹) ∂K/∂θ)`
//!
//! Predictions reuse the Cholesky factor of the training covariance:
//!
//! - mean `μ = k*ᵀ α`, `∇μ = Jᵀ α`, `Hμ = Σ αᵢ Hkᵢ`
//! - variance `v = σ² - k*ᵀ K⁻¹ k*`, `∇v = -2 Jᵀ K⁻¹ k*`,
//!   `Hv = -2 (Jᵀ K⁻¹ J + Σ (K⁻¹k*)ᵢ Hkᵢ)`
//!
//! where `J` stacks the kernel gradients `∇k(x, xᵢ)ᵀ` row by row.

use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, Dyn};

use super::kernel::{Kernel, KernelParams};
use super::{EvalRequest, OutputEval, Prediction, SurrogateModel, assemble, check_inputs, std_from_variance};
use crate::error::{Error, Result};
use crate::normalization::{StandardScaler, TrainingSet};
use crate::optim::lbfgs::{LbfgsConfig, multistart};
use crate::rng_util::f64_range;

/// Default number of random restarts of the likelihood optimizer.
const DEFAULT_N_RESTARTS: usize = 2;

/// Diagonal jitter tried, in order, when a Cholesky factorization fails.
const JITTER: [f64; 5] = [0.0, 1e-10, 1e-8, 1e-6, 1e-4];

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Log-space bounds of the signal and length scales: `[√1e-3, √1e3]`.
fn scale_log_bounds() -> (f64, f64) {
    (0.5 * 1e-3_f64.ln(), 0.5 * 1e3_f64.ln())
}

/// Log-space bounds of the noise variance: `[1e-6, 1e-2]`.
fn noise_log_bounds() -> (f64, f64) {
    (1e-6_f64.ln(), 1e-2_f64.ln())
}

/// Fitted hyperparameters of one output.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpHyperparameters {
    /// Kernel signal variance and length scales.
    pub kernel: KernelParams,
    /// Observation noise variance.
    pub noise_variance: f64,
}

impl GpHyperparameters {
    /// Decode `[log s, log ℓ₁, …, log ℓ_d, log noise]`, with `σ² = s²`.
    fn from_log(theta: &[f64]) -> Self {
        let d = theta.len() - 2;
        Self {
            kernel: KernelParams {
                signal_variance: (2.0 * theta[0]).exp(),
                length_scales: theta[1..=d].iter().map(|t| t.exp()).collect(),
            },
            noise_variance: theta[d + 1].exp(),
        }
    }
}

struct FittedOutput {
    hyper: GpHyperparameters,
    cholesky: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    y: Vec<f64>,
}

struct Fitted {
    x: Vec<Vec<f64>>,
    outputs: Vec<FittedOutput>,
    y_scaler: StandardScaler,
}

/// Gaussian process surrogate.
///
/// # Examples
///
/// ```
/// use mobo_core::surrogate::{GaussianProcess, Kernel};
///
/// let gp = GaussianProcess::builder()
///     .kernel(Kernel::Matern32)
///     .n_restarts(4)
///     .build();
/// ```
pub struct GaussianProcess {
    kernel: Kernel,
    n_restarts: usize,
    optimizer: LbfgsConfig,
    fitted: Option<Fitted>,
}

impl Default for GaussianProcess {
    fn default() -> Self {
        GaussianProcessBuilder::new().build()
    }
}

impl core::fmt::Debug for GaussianProcess {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GaussianProcess")
            .field("kernel", &self.kernel)
            .field("n_restarts", &self.n_restarts)
            .field("fitted", &self.fitted.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`GaussianProcess`].
#[derive(Clone, Debug, Default)]
pub struct GaussianProcessBuilder {
    kernel: Kernel,
    n_restarts: Option<usize>,
    optimizer: Option<LbfgsConfig>,
}

impl GaussianProcessBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Covariance family. Default: [`Kernel::Matern52`].
    #[must_use]
    pub fn kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// Random restarts of the likelihood optimizer in addition to the
    /// default start. Default: 2.
    #[must_use]
    pub fn n_restarts(mut self, n: usize) -> Self {
        self.n_restarts = Some(n);
        self
    }

    /// Settings of the likelihood optimizer.
    #[must_use]
    pub fn optimizer(mut self, config: LbfgsConfig) -> Self {
        self.optimizer = Some(config);
        self
    }

    /// Build the (unfitted) process.
    #[must_use]
    pub fn build(self) -> GaussianProcess {
        GaussianProcess {
            kernel: self.kernel,
            n_restarts: self.n_restarts.unwrap_or(DEFAULT_N_RESTARTS),
            optimizer: self.optimizer.unwrap_or_default(),
            fitted: None,
        }
    }
}

impl GaussianProcess {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> GaussianProcessBuilder {
        GaussianProcessBuilder::new()
    }

    /// The covariance family.
    #[must_use]
    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    fn fitted(&self) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or(Error::NotFitted {
            component: "gaussian process",
        })
    }

    /// Normalized training designs.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before fit.
    pub fn train_x(&self) -> Result<&[Vec<f64>]> {
        Ok(&self.fitted()?.x)
    }

    /// Standardized training targets of objective `j`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before fit and `Error::DimensionMismatch`
    /// for an out-of-range objective.
    pub fn train_y(&self, j: usize) -> Result<&[f64]> {
        Ok(&self.output(j)?.y)
    }

    /// Fitted hyperparameters of objective `j`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before fit and `Error::DimensionMismatch`
    /// for an out-of-range objective.
    pub fn hyperparameters(&self, j: usize) -> Result<&GpHyperparameters> {
        Ok(&self.output(j)?.hyper)
    }

    /// Scaler mapping standardized outputs back to raw units.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before fit.
    pub fn y_scaler(&self) -> Result<&StandardScaler> {
        Ok(&self.fitted()?.y_scaler)
    }

    fn output(&self, j: usize) -> Result<&FittedOutput> {
        let fitted = self.fitted()?;
        fitted.outputs.get(j).ok_or(Error::DimensionMismatch {
            what: "objective index",
            expected: fitted.outputs.len(),
            got: j,
        })
    }

    fn fit_output(&self, x: &[Vec<f64>], y: Vec<f64>, rng: &mut fastrand::Rng) -> Result<FittedOutput> {
        let d = x[0].len();
        let (s_lo, s_hi) = scale_log_bounds();
        let (n_lo, n_hi) = noise_log_bounds();
        let mut bounds = vec![(s_lo, s_hi); d + 1];
        bounds.push((n_lo, n_hi));

        let mut starts = Vec::with_capacity(self.n_restarts + 1);
        let mut default_start = vec![0.0; d + 1];
        default_start.push(1e-4_f64.ln());
        starts.push(default_start);
        for _ in 0..self.n_restarts {
            starts.push(bounds.iter().map(|&(lo, hi)| f64_range(rng, lo, hi)).collect());
        }

        let kernel = self.kernel;
        let y_vec = DVector::from_column_slice(&y);
        let best = multistart(
            |theta| negative_log_likelihood(kernel, x, &y_vec, theta),
            &starts,
            &bounds,
            &self.optimizer,
        )
        .ok_or(Error::LinearAlgebra("no likelihood optimizer start"))?;

        let hyper = GpHyperparameters::from_log(&best.x);
        let k = covariance(kernel, &hyper, x);
        let cholesky = jittered_cholesky(k).ok_or(Error::LinearAlgebra("kernel matrix is not positive definite"))?;
        let alpha = cholesky.solve(&y_vec);

        trace_debug!(
            nll = best.fun,
            signal_variance = hyper.kernel.signal_variance,
            noise_variance = hyper.noise_variance,
            "gaussian process output fitted"
        );

        Ok(FittedOutput {
            hyper,
            cholesky,
            alpha,
            y,
        })
    }

    fn evaluate_output(&self, out: &FittedOutput, x_train: &[Vec<f64>], x: &[f64], request: EvalRequest) -> OutputEval {
        let params = &out.hyper.kernel;
        let n = x_train.len();
        let d = x.len();
        let k_star = DVector::from_fn(n, |i, _| self.kernel.value(params, x, &x_train[i]));
        let mean = k_star.dot(&out.alpha);
        let mut eval = OutputEval {
            mean,
            ..OutputEval::default()
        };

        let need_grad = request.gradient || request.hessian;
        let jac = need_grad.then(|| {
            let mut jac = DMatrix::zeros(n, d);
            for (i, xi) in x_train.iter().enumerate() {
                jac.row_mut(i).copy_from(&self.kernel.gradient(params, x, xi).transpose());
            }
            jac
        });
        let w = request.std.then(|| out.cholesky.solve(&k_star));

        let mut mean_hess = DMatrix::zeros(d, d);
        let mut var_hess_sum = DMatrix::zeros(d, d);
        if request.hessian {
            for (i, xi) in x_train.iter().enumerate() {
                let hk = self.kernel.hessian(params, x, xi);
                mean_hess += &hk * out.alpha[i];
                if let Some(w) = &w {
                    var_hess_sum += &hk * w[i];
                }
            }
        }

        if let Some(jac) = &jac
            && request.gradient
        {
            eval.mean_grad = Some(jac.transpose() * &out.alpha);
        }
        if request.hessian {
            eval.mean_hess = Some(mean_hess);
        }

        if let Some(w) = &w {
            let var = params.signal_variance - k_star.dot(w);
            let dvar = jac.as_ref().map(|jac| jac.transpose() * w * -2.0);
            let hvar = match &jac {
                Some(jac) if request.hessian => {
                    let kinv_j = out.cholesky.solve(jac);
                    Some((jac.transpose() * kinv_j + var_hess_sum) * -2.0)
                }
                _ => None,
            };
            let (s, ds, hs) = std_from_variance(var, dvar.as_ref(), hvar.as_ref());
            eval.std = Some(s);
            eval.std_grad = ds.filter(|_| request.gradient);
            eval.std_hess = hs;
        }
        eval
    }
}

impl SurrogateModel for GaussianProcess {
    fn fit(&mut self, data: &TrainingSet, rng: &mut fastrand::Rng) -> Result<()> {
        if data.is_empty() {
            return Err(Error::EmptyDataset);
        }
        let outputs = (0..data.n_obj())
            .map(|j| self.fit_output(&data.x, data.y_column(j), rng))
            .collect::<Result<Vec<_>>>()?;

        trace_info!(
            n_points = data.len(),
            n_obj = data.n_obj(),
            kernel = ?self.kernel,
            "gaussian process fitted"
        );

        self.fitted = Some(Fitted {
            x: data.x.clone(),
            outputs,
            y_scaler: data.y_scaler.clone(),
        });
        Ok(())
    }

    fn evaluate(&self, x: &[Vec<f64>], request: EvalRequest) -> Result<Prediction> {
        let fitted = self.fitted()?;
        let n_var = self.n_var();
        check_inputs(x, n_var)?;
        let evals = x
            .iter()
            .map(|xq| {
                fitted
                    .outputs
                    .iter()
                    .map(|out| self.evaluate_output(out, &fitted.x, xq, request))
                    .collect()
            })
            .collect();
        assemble(evals, request, n_var, &fitted.y_scaler)
    }

    fn n_var(&self) -> usize {
        self.fitted
            .as_ref()
            .and_then(|f| f.x.first())
            .map_or(0, Vec::len)
    }

    fn n_obj(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.outputs.len())
    }

    fn as_gaussian_process(&self) -> Option<&GaussianProcess> {
        Some(self)
    }
}

// ---------------------------------------------------------------------------
// Likelihood
// ---------------------------------------------------------------------------

fn covariance(kernel: Kernel, hyper: &GpHyperparameters, x: &[Vec<f64>]) -> DMatrix<f64> {
    let mut k = kernel.matrix(&hyper.kernel, x, x);
    for i in 0..x.len() {
        k[(i, i)] += hyper.noise_variance;
    }
    k
}

pub(crate) fn jittered_cholesky(k: DMatrix<f64>) -> Option<Cholesky<f64, Dyn>> {
    let n = k.nrows();
    for jitter in JITTER {
        let mut attempt = k.clone();
        for i in 0..n {
            attempt[(i, i)] += jitter;
        }
        if let Some(chol) = Cholesky::new(attempt) {
            return Some(chol);
        }
    }
    None
}

/// Negative log marginal likelihood and its gradient in log space.
#[allow(clippy::cast_precision_loss)]
fn negative_log_likelihood(kernel: Kernel, x: &[Vec<f64>], y: &DVector<f64>, theta: &[f64]) -> (f64, Vec<f64>) {
    let n = x.len();
    let hyper = GpHyperparameters::from_log(theta);
    let Some(chol) = jittered_cholesky(covariance(kernel, &hyper, x)) else {
        return (f64::INFINITY, vec![0.0; theta.len()]);
    };
    let alpha = chol.solve(y);
    let log_det: f64 = chol.l_dirty().diagonal().iter().map(|v| v.ln()).sum::<f64>() * 2.0;
    let nll = 0.5 * y.dot(&alpha) + 0.5 * log_det + 0.5 * n as f64 * LN_2PI;

    // Q = ααᵀ - K⁻¹
    let q = &alpha * alpha.transpose() - chol.inverse();

    let n_kernel = theta.len() - 1;
    let mut grad = vec![0.0; theta.len()];
    let mut pair = vec![0.0; n_kernel];
    for i in 0..n {
        for j in 0..=i {
            kernel.value_and_param_gradient(&hyper.kernel, &x[i], &x[j], &mut pair);
            let weight = if i == j { q[(i, j)] } else { 2.0 * q[(i, j)] };
            for (g, dk) in grad.iter_mut().zip(&pair) {
                *g += weight * dk;
            }
        }
    }
    grad[n_kernel] = hyper.noise_variance * q.trace();
    for g in &mut grad {
        *g *= -0.5;
    }
    (nll, grad)
}

//! Thompson sampling through random Fourier features.
//!
//! A stationary kernel is approximated by `m` features
//! `φ(x) = √(2σ²/m) cos(W x + b)`, where the rows of `W` are drawn from the
//! kernel's spectral density (Gaussian for the squared exponential,
//! Student-t with `ν = 1, 3, 5` for the Matérn family) and `b ~ U(0, 2π)`.
//! Bayesian linear regression on the features gives a Gaussian posterior
//! over the weights, from which one sample per objective is drawn at fit
//! time. Evaluating that sample is deterministic and cheap, with exact
//! gradients and Hessians.

use nalgebra::{DMatrix, DVector};

use super::{Acquisition, AcquisitionValue};
use crate::error::{Error, Result, check_dim};
use crate::normalization::TrainingSet;
use crate::rng_util::{chi_square, f64_range, standard_normal};
use crate::surrogate::gp::jittered_cholesky;
use crate::surrogate::{GaussianProcess, SurrogateModel};

const DEFAULT_FEATURES: usize = 500;

/// One posterior draw for one objective.
#[derive(Clone, Debug)]
struct PosteriorSample {
    /// Spectral frequencies, `m × n_var`.
    w: DMatrix<f64>,
    /// Phases.
    b: DVector<f64>,
    /// Sampled feature weights.
    theta: DVector<f64>,
    /// Feature amplitude `√(2σ²/m)`.
    amplitude: f64,
    /// Raw-unit mapping of the standardized output.
    scale: f64,
    offset: f64,
}

impl PosteriorSample {
    fn draw(gp: &GaussianProcess, j: usize, n_features: usize, rng: &mut fastrand::Rng) -> Result<Self> {
        let x = gp.train_x()?;
        let y = gp.train_y(j)?;
        let hyper = gp.hyperparameters(j)?;
        let scaler = gp.y_scaler()?;
        let n_var = hyper.kernel.length_scales.len();
        let m = n_features.max(1);
        let dof = gp.kernel().spectral_dof();

        let mut w = DMatrix::zeros(m, n_var);
        for k in 0..m {
            // Student-t rows: a Gaussian row divided by √(χ²_ν / ν).
            let shrink = dof.map_or(1.0, |nu| (chi_square(rng, nu) / nu).sqrt());
            for (i, ell) in hyper.kernel.length_scales.iter().enumerate() {
                w[(k, i)] = standard_normal(rng) / (ell * shrink);
            }
        }
        let b = DVector::from_fn(m, |_, _| f64_range(rng, 0.0, core::f64::consts::TAU));
        #[allow(clippy::cast_precision_loss)]
        let amplitude = (2.0 * hyper.kernel.signal_variance / m as f64).sqrt();

        let phi = DMatrix::from_fn(x.len(), m, |i, k| {
            let wx: f64 = w.row(k).iter().zip(&x[i]).map(|(wk, xi)| wk * xi).sum();
            amplitude * (wx + b[k]).cos()
        });
        let noise = hyper.noise_variance;
        let a = phi.transpose() * &phi + DMatrix::identity(m, m) * noise;
        let chol = jittered_cholesky(a).ok_or(Error::LinearAlgebra("feature posterior is not positive definite"))?;
        let mean = chol.solve(&(phi.transpose() * DVector::from_column_slice(y)));
        let z = DVector::from_fn(m, |_, _| standard_normal(rng));
        let deviation = chol
            .l()
            .tr_solve_lower_triangular(&z)
            .ok_or(Error::LinearAlgebra("singular feature posterior factor"))?;
        let theta = mean + deviation * noise.sqrt();

        Ok(Self {
            w,
            b,
            theta,
            amplitude,
            scale: scaler.factor(j)?,
            offset: scaler.mean()?[j],
        })
    }

    /// Raw-unit value, gradient, and Hessian at one normalized design.
    fn eval(&self, x: &[f64], gradient: bool, hessian: bool) -> (f64, Option<DVector<f64>>, Option<DMatrix<f64>>) {
        let n_var = self.w.ncols();
        let c = self.amplitude * self.scale;
        let mut f = 0.0;
        let mut df = gradient.then(|| DVector::zeros(n_var));
        let mut hf = hessian.then(|| DMatrix::zeros(n_var, n_var));
        for k in 0..self.w.nrows() {
            let wk = self.w.row(k);
            let arg = wk.iter().zip(x).map(|(a, b)| a * b).sum::<f64>() + self.b[k];
            let (sin, cos) = arg.sin_cos();
            f += self.theta[k] * cos;
            if let Some(df) = df.as_mut() {
                *df -= wk.transpose() * (c * self.theta[k] * sin);
            }
            if let Some(hf) = hf.as_mut() {
                *hf -= wk.transpose() * wk * (c * self.theta[k] * cos);
            }
        }
        (self.offset + c * f, df, hf)
    }
}

/// Random-feature posterior sample of a Gaussian process surrogate.
///
/// Fitting fails with [`Error::UnsupportedConfiguration`] for any other
/// surrogate kind.
#[derive(Clone, Debug)]
pub struct ThompsonSampling {
    n_features: usize,
    samples: Option<Vec<PosteriorSample>>,
}

impl Default for ThompsonSampling {
    fn default() -> Self {
        Self::new(DEFAULT_FEATURES)
    }
}

impl ThompsonSampling {
    /// Sampler with `n_features` random Fourier features per objective.
    #[must_use]
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features: n_features.max(1),
            samples: None,
        }
    }

    /// Number of random features per objective.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

impl Acquisition for ThompsonSampling {
    fn fit(&mut self, surrogate: &dyn SurrogateModel, data: &TrainingSet, rng: &mut fastrand::Rng) -> Result<()> {
        if data.is_empty() {
            return Err(Error::EmptyDataset);
        }
        let gp = surrogate.as_gaussian_process().ok_or_else(|| {
            Error::UnsupportedConfiguration("thompson sampling requires a gaussian process surrogate".into())
        })?;
        let samples = (0..gp.n_obj())
            .map(|j| PosteriorSample::draw(gp, j, self.n_features, rng))
            .collect::<Result<Vec<_>>>()?;
        trace_debug!(n_features = self.n_features, n_obj = samples.len(), "thompson sample drawn");
        self.samples = Some(samples);
        Ok(())
    }

    fn evaluate(
        &self,
        _surrogate: &dyn SurrogateModel,
        x: &[Vec<f64>],
        gradient: bool,
        hessian: bool,
    ) -> Result<AcquisitionValue> {
        let samples = self.samples.as_ref().ok_or(Error::NotFitted {
            component: "thompson sampling",
        })?;
        let n_var = samples.first().map_or(0, |s| s.w.ncols());
        let mut out = AcquisitionValue {
            f: Vec::with_capacity(x.len()),
            df: gradient.then(|| Vec::with_capacity(x.len())),
            hf: hessian.then(|| Vec::with_capacity(x.len())),
        };
        for xi in x {
            check_dim("design variables", n_var, xi.len())?;
            let mut row = Vec::with_capacity(samples.len());
            let mut grad = DMatrix::zeros(samples.len(), n_var);
            let mut hess = Vec::with_capacity(samples.len());
            for (j, sample) in samples.iter().enumerate() {
                let (f, df, hf) = sample.eval(xi, gradient, hessian);
                row.push(f);
                if let Some(df) = df {
                    grad.row_mut(j).copy_from(&df.transpose());
                }
                if let Some(hf) = hf {
                    hess.push(hf);
                }
            }
            out.f.push(row);
            if let Some(df) = out.df.as_mut() {
                df.push(grad);
            }
            if let Some(hf) = out.hf.as_mut() {
                hf.push(hess);
            }
        }
        Ok(out)
    }

    fn requires_std(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::test_support::{check_derivatives, fitted_gp};
    use crate::surrogate::NeuralNetwork;

    #[test]
    fn test_requires_gaussian_process() {
        let (_, data) = fitted_gp();
        let nn = NeuralNetwork::default();
        let mut ts = ThompsonSampling::default();
        assert!(matches!(
            ts.fit(&nn, &data, &mut fastrand::Rng::with_seed(0)),
            Err(Error::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn test_sample_is_deterministic_per_seed() {
        let (gp, data) = fitted_gp();
        let x = vec![vec![0.2, 0.8], vec![0.7, 0.1]];
        let mut a = ThompsonSampling::new(200);
        let mut b = ThompsonSampling::new(200);
        let mut c = ThompsonSampling::new(200);
        a.fit(&gp, &data, &mut fastrand::Rng::with_seed(5)).unwrap();
        b.fit(&gp, &data, &mut fastrand::Rng::with_seed(5)).unwrap();
        c.fit(&gp, &data, &mut fastrand::Rng::with_seed(6)).unwrap();
        let fa = a.evaluate(&gp, &x, false, false).unwrap().f;
        let fb = b.evaluate(&gp, &x, false, false).unwrap().f;
        let fc = c.evaluate(&gp, &x, false, false).unwrap().f;
        assert_eq!(fa, fb);
        assert_ne!(fa, fc);
        assert!(fa.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_derivatives() {
        let (gp, data) = fitted_gp();
        let mut ts = ThompsonSampling::new(100);
        ts.fit(&gp, &data, &mut fastrand::Rng::with_seed(9)).unwrap();
        check_derivatives(&ts, &gp, &[0.41, 0.29], 1e-3);
    }

    #[test]
    fn test_dimension_mismatch() {
        let (gp, data) = fitted_gp();
        let mut ts = ThompsonSampling::new(50);
        ts.fit(&gp, &data, &mut fastrand::Rng::with_seed(1)).unwrap();
        assert!(matches!(
            ts.evaluate(&gp, &[vec![0.1, 0.2, 0.3]], false, false),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}

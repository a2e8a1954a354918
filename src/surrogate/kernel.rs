//! Stationary covariance functions with ARD length scales.
//!
//! Every kernel is written as `k(x, x') = σ² f(r)` with
//! `r = ‖(x - x') / ℓ‖`. Derivatives are expressed through the radial
//! profile `f` and the helpers `g = f'(r) / r` and `h = g'(r) / r`:
//!
//! - `∂k/∂x = σ² g u`, with `u_j = (x_j - x'_j) / ℓ_j²`
//! - `∂²k/∂x² = σ² (h u uᵀ + g diag(1 / ℓ²))`
//! - `∂k/∂log ℓ_m = -σ² g d_m²`, with `d_m = (x_m - x'_m) / ℓ_m`
//!
//! Terms that are singular at coincident points (Matérn 1/2 and 3/2) go
//! through [`safe_divide`] and vanish there.

use core::str::FromStr;

use nalgebra::{DMatrix, DVector};

use super::safe_divide;
use crate::error::{Error, Result};

/// Covariance family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Kernel {
    /// Matérn ν = 1/2 (exponential).
    Matern12,
    /// Matérn ν = 3/2.
    Matern32,
    /// Matérn ν = 5/2 (default).
    #[default]
    Matern52,
    /// Squared exponential (RBF).
    SquaredExponential,
}

impl FromStr for Kernel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "matern12" | "matern1/2" => Ok(Self::Matern12),
            "matern32" | "matern3/2" => Ok(Self::Matern32),
            "matern52" | "matern5/2" => Ok(Self::Matern52),
            "rbf" | "se" | "squared_exponential" => Ok(Self::SquaredExponential),
            other => Err(Error::UnsupportedConfiguration(format!("unknown kernel '{other}'"))),
        }
    }
}

/// Radial profile `f(r)` with its scaled derivatives `g` and `h`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Profile {
    pub(crate) f: f64,
    pub(crate) g: f64,
    pub(crate) h: f64,
}

impl Kernel {
    /// Degrees of freedom of the Student-t spectral density, `None` for
    /// the Gaussian spectrum of the squared exponential.
    #[must_use]
    pub fn spectral_dof(self) -> Option<f64> {
        match self {
            Self::Matern12 => Some(1.0),
            Self::Matern32 => Some(3.0),
            Self::Matern52 => Some(5.0),
            Self::SquaredExponential => None,
        }
    }

    pub(crate) fn profile(self, r: f64) -> Profile {
        match self {
            Self::SquaredExponential => {
                let f = (-0.5 * r * r).exp();
                Profile { f, g: -f, h: f }
            }
            Self::Matern12 => {
                let f = (-r).exp();
                Profile {
                    f,
                    g: -safe_divide(f, r),
                    h: safe_divide(f * (r + 1.0), r * r * r),
                }
            }
            Self::Matern32 => {
                let a = 3.0_f64.sqrt();
                let e = (-a * r).exp();
                Profile {
                    f: (1.0 + a * r) * e,
                    g: -3.0 * e,
                    h: safe_divide(3.0 * a * e, r),
                }
            }
            Self::Matern52 => {
                let b = 5.0_f64.sqrt();
                let e = (-b * r).exp();
                Profile {
                    f: (1.0 + b * r + 5.0 / 3.0 * r * r) * e,
                    g: -5.0 / 3.0 * (1.0 + b * r) * e,
                    h: 25.0 / 3.0 * e,
                }
            }
        }
    }
}

/// Fitted kernel hyperparameters for one output.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KernelParams {
    /// Signal variance `σ²`.
    pub signal_variance: f64,
    /// Per-dimension length scales `ℓ`.
    pub length_scales: Vec<f64>,
}

impl KernelParams {
    /// Unit signal variance and unit length scales.
    #[must_use]
    pub fn unit(n_var: usize) -> Self {
        Self {
            signal_variance: 1.0,
            length_scales: vec![1.0; n_var],
        }
    }

    pub(crate) fn scaled_distance(&self, x1: &[f64], x2: &[f64]) -> f64 {
        x1.iter()
            .zip(x2)
            .zip(&self.length_scales)
            .map(|((a, b), l)| ((a - b) / l).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

impl Kernel {
    /// Covariance `k(x1, x2)`.
    #[must_use]
    pub fn value(self, params: &KernelParams, x1: &[f64], x2: &[f64]) -> f64 {
        params.signal_variance * self.profile(params.scaled_distance(x1, x2)).f
    }

    /// Gradient of `k(x, x')` with respect to `x`.
    pub(crate) fn gradient(self, params: &KernelParams, x: &[f64], x_train: &[f64]) -> DVector<f64> {
        let p = self.profile(params.scaled_distance(x, x_train));
        DVector::from_iterator(
            x.len(),
            x.iter()
                .zip(x_train)
                .zip(&params.length_scales)
                .map(|((a, b), l)| params.signal_variance * p.g * (a - b) / (l * l)),
        )
    }

    /// Hessian of `k(x, x')` with respect to `x`.
    pub(crate) fn hessian(self, params: &KernelParams, x: &[f64], x_train: &[f64]) -> DMatrix<f64> {
        let p = self.profile(params.scaled_distance(x, x_train));
        let d = x.len();
        let u: Vec<f64> = (0..d)
            .map(|j| (x[j] - x_train[j]) / params.length_scales[j].powi(2))
            .collect();
        DMatrix::from_fn(d, d, |i, j| {
            let diag = if i == j {
                p.g / params.length_scales[i].powi(2)
            } else {
                0.0
            };
            params.signal_variance * (p.h * u[i] * u[j] + diag)
        })
    }

    /// Covariance matrix between two point sets, without noise.
    pub(crate) fn matrix(self, params: &KernelParams, a: &[Vec<f64>], b: &[Vec<f64>]) -> DMatrix<f64> {
        DMatrix::from_fn(a.len(), b.len(), |i, j| self.value(params, &a[i], &b[j]))
    }

    /// Value and log-hyperparameter gradient for one pair.
    ///
    /// The gradient holds `∂k/∂log s` (with `σ² = s²`) followed by
    /// `∂k/∂log ℓ_m` for every dimension.
    pub(crate) fn value_and_param_gradient(
        self,
        params: &KernelParams,
        x1: &[f64],
        x2: &[f64],
        out: &mut [f64],
    ) -> f64 {
        let p = self.profile(params.scaled_distance(x1, x2));
        let k = params.signal_variance * p.f;
        out[0] = 2.0 * k;
        for (m, ((a, b), l)) in x1.iter().zip(x2).zip(&params.length_scales).enumerate() {
            let d = (a - b) / l;
            out[m + 1] = -params.signal_variance * p.g * d * d;
        }
        k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Kernel; 4] = [
        Kernel::Matern12,
        Kernel::Matern32,
        Kernel::Matern52,
        Kernel::SquaredExponential,
    ];

    fn params() -> KernelParams {
        KernelParams {
            signal_variance: 1.7,
            length_scales: vec![0.4, 1.3],
        }
    }

    #[test]
    fn test_value_at_zero_is_signal_variance() {
        for k in ALL {
            assert!((k.value(&params(), &[0.3, 0.3], &[0.3, 0.3]) - 1.7).abs() < 1e-12);
        }
    }

    #[test]
    fn test_matern52_closed_form() {
        let p = KernelParams::unit(1);
        let r: f64 = 0.8;
        let s5 = 5.0_f64.sqrt();
        let expected = (1.0 + s5 * r + 5.0 / 3.0 * r * r) * (-s5 * r).exp();
        assert!((Kernel::Matern52.value(&p, &[r], &[0.0]) - expected).abs() < 1e-14);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let x = [0.21, 0.67];
        let xt = [0.5, 0.1];
        let eps = 1e-6;
        for k in ALL {
            let g = k.gradient(&params(), &x, &xt);
            for j in 0..2 {
                let mut xp = x;
                let mut xm = x;
                xp[j] += eps;
                xm[j] -= eps;
                let fd = (k.value(&params(), &xp, &xt) - k.value(&params(), &xm, &xt)) / (2.0 * eps);
                assert!((g[j] - fd).abs() < 1e-6, "{k:?} dim {j}: {} vs {fd}", g[j]);
            }
        }
    }

    #[test]
    fn test_hessian_matches_finite_difference() {
        let x = [0.21, 0.67];
        let xt = [0.5, 0.1];
        let eps = 1e-5;
        for k in ALL {
            let h = k.hessian(&params(), &x, &xt);
            for j in 0..2 {
                let mut xp = x;
                let mut xm = x;
                xp[j] += eps;
                xm[j] -= eps;
                let gp = k.gradient(&params(), &xp, &xt);
                let gm = k.gradient(&params(), &xm, &xt);
                for i in 0..2 {
                    let fd = (gp[i] - gm[i]) / (2.0 * eps);
                    assert!((h[(i, j)] - fd).abs() < 1e-5, "{k:?} ({i},{j}): {} vs {fd}", h[(i, j)]);
                }
            }
        }
    }

    #[test]
    fn test_singular_terms_vanish_at_coincident_points() {
        for k in ALL {
            let h = k.hessian(&params(), &[0.2, 0.2], &[0.2, 0.2]);
            assert!(h.iter().all(|v| v.is_finite()));
            let g = k.gradient(&params(), &[0.2, 0.2], &[0.2, 0.2]);
            assert!(g.iter().all(|v| v.abs() < 1e-15));
        }
    }

    #[test]
    fn test_param_gradient_matches_finite_difference() {
        let x1 = [0.1, 0.9];
        let x2 = [0.4, 0.3];
        let eps: f64 = 1e-6;
        for k in ALL {
            let mut grad = vec![0.0; 3];
            k.value_and_param_gradient(&params(), &x1, &x2, &mut grad);
            for m in 0..2 {
                let mut up = params();
                let mut down = params();
                up.length_scales[m] *= eps.exp();
                down.length_scales[m] *= (-eps).exp();
                let fd = (k.value(&up, &x1, &x2) - k.value(&down, &x1, &x2)) / (2.0 * eps);
                assert!((grad[m + 1] - fd).abs() < 1e-6, "{k:?} ℓ{m}: {} vs {fd}", grad[m + 1]);
            }
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("rbf".parse::<Kernel>().unwrap(), Kernel::SquaredExponential);
        assert!("linear".parse::<Kernel>().is_err());
    }
}

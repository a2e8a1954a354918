//! Local penalization around busy candidates.
//!
//! While some candidates are still being evaluated, a batch method can
//! discourage proposals close to them. For each busy point `x_b` and
//! objective, an exclusion factor `Φ(z_b)` with
//!
//! `z_b = (L ‖x - x_b‖ + M - μ(x_b)) / s(x_b)`
//!
//! is multiplied onto the softplus-transformed base acquisition. `M` is the
//! best observed value and `L` a Lipschitz estimate of the posterior mean,
//! taken as the largest gradient norm over the whole design space or over a
//! box around each busy point. Products are taken in log space.

use super::{Acquisition, AcquisitionValue, best_observed, norm_cdf};
use crate::error::{Error, Result, check_dim};
use crate::normalization::TrainingSet;
use crate::optim::{LbfgsConfig, multistart};
use crate::rng_util::f64_range;
use crate::surrogate::{EvalRequest, SurrogateModel, safe_divide};

const LOG_FLOOR: f64 = 1e-300;
const MIN_LIPSCHITZ: f64 = 1e-7;
const N_CANDIDATES: usize = 200;
const N_STARTS: usize = 3;

/// Region over which the Lipschitz constant is estimated.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LipschitzMode {
    /// One constant per objective over the unit box.
    #[default]
    Global,
    /// One constant per busy point and objective, over the box of
    /// half-width `radius` around the busy point (clipped to the unit box).
    Local {
        /// Half-width in normalized units.
        radius: f64,
    },
}

/// Exclusion zone of one busy point.
#[derive(Clone, Debug)]
struct Zone {
    centre: Vec<f64>,
    mean: Vec<f64>,
    std: Vec<f64>,
    lipschitz: Vec<f64>,
}

/// Base acquisition penalized around busy points.
///
/// Busy points are given in normalized coordinates and must be set before
/// [`fit`](Acquisition::fit). Derivatives are not available: requesting a
/// gradient or Hessian fails with [`Error::NotImplemented`].
pub struct LocalPenalization {
    base: Box<dyn Acquisition>,
    mode: LipschitzMode,
    busy: Vec<Vec<f64>>,
    optimizer: LbfgsConfig,
    fitted: Option<(Vec<Zone>, Vec<f64>)>,
}

impl core::fmt::Debug for LocalPenalization {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocalPenalization")
            .field("mode", &self.mode)
            .field("busy", &self.busy.len())
            .field("fitted", &self.fitted.is_some())
            .finish_non_exhaustive()
    }
}

impl LocalPenalization {
    /// Wrap `base` with the given Lipschitz mode and no busy points.
    #[must_use]
    pub fn new(base: Box<dyn Acquisition>, mode: LipschitzMode) -> Self {
        Self {
            base,
            mode,
            busy: Vec::new(),
            optimizer: LbfgsConfig {
                max_iter: 50,
                ..LbfgsConfig::default()
            },
            fitted: None,
        }
    }

    /// Sets the busy points (normalized).
    #[must_use]
    pub fn with_busy_points(mut self, points: Vec<Vec<f64>>) -> Self {
        self.busy = points;
        self
    }

    /// Replaces the busy points. Takes effect at the next fit.
    pub fn set_busy_points(&mut self, points: Vec<Vec<f64>>) {
        self.busy = points;
        self.fitted = None;
    }

    /// The busy points.
    #[must_use]
    pub fn busy_points(&self) -> &[Vec<f64>] {
        &self.busy
    }

    /// The Lipschitz mode.
    #[must_use]
    pub fn mode(&self) -> LipschitzMode {
        self.mode
    }

    /// Fitted per-objective Lipschitz constants of busy point `b`.
    #[must_use]
    pub fn lipschitz(&self, b: usize) -> Option<&[f64]> {
        self.fitted.as_ref()?.0.get(b).map(|z| z.lipschitz.as_slice())
    }
}

/// Largest posterior-mean gradient norm of objective `j` within `bounds`.
fn max_gradient_norm(
    surrogate: &dyn SurrogateModel,
    j: usize,
    bounds: &[(f64, f64)],
    config: &LbfgsConfig,
    rng: &mut fastrand::Rng,
) -> Result<f64> {
    let candidates: Vec<Vec<f64>> = (0..N_CANDIDATES)
        .map(|_| bounds.iter().map(|&(lo, hi)| f64_range(rng, lo, hi)).collect())
        .collect();
    let pred = surrogate.evaluate(&candidates, EvalRequest::mean().with_gradient())?;
    let grads = pred.mean_grad.ok_or(Error::NotImplemented("posterior mean gradient"))?;
    let mut ranked: Vec<(f64, usize)> = grads.iter().enumerate().map(|(i, g)| (g.row(j).norm(), i)).collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    let best_sampled = ranked.first().map_or(0.0, |r| r.0);
    let starts: Vec<Vec<f64>> = ranked.iter().take(N_STARTS).map(|&(_, i)| candidates[i].clone()).collect();

    // Surface surrogate errors here so the objective below can treat a
    // failure as an uninformative point.
    let request = EvalRequest::mean().with_gradient().with_hessian();
    surrogate.evaluate(&starts[..1.min(starts.len())], request)?;

    let n_var = bounds.len();
    let objective = |x: &[f64]| -> (f64, Vec<f64>) {
        let Ok(p) = surrogate.evaluate(&[x.to_vec()], request) else {
            return (0.0, vec![0.0; n_var]);
        };
        let (Some(g), Some(h)) = (p.mean_grad, p.mean_hess) else {
            return (0.0, vec![0.0; n_var]);
        };
        let dmu = g[0].row(j).transpose();
        let norm = dmu.norm();
        let grad = -(&h[0][j] * &dmu) * safe_divide(1.0, norm);
        (-norm, grad.iter().copied().collect())
    };
    let searched = multistart(objective, &starts, bounds, config).map_or(0.0, |m| -m.fun);
    Ok(searched.max(best_sampled).max(MIN_LIPSCHITZ))
}

fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

impl Acquisition for LocalPenalization {
    fn fit(&mut self, surrogate: &dyn SurrogateModel, data: &TrainingSet, rng: &mut fastrand::Rng) -> Result<()> {
        self.base.fit(surrogate, data, rng)?;
        let y_min = best_observed(data)?;
        let n_var = data.n_var();
        let n_obj = data.n_obj();
        for point in &self.busy {
            check_dim("busy point variables", n_var, point.len())?;
        }
        if self.busy.is_empty() {
            self.fitted = Some((Vec::new(), y_min));
            return Ok(());
        }

        let pred = surrogate.evaluate(&self.busy, EvalRequest::mean().with_std())?;
        let std = pred.require_std()?;

        let global = match self.mode {
            LipschitzMode::Global => {
                let bounds = vec![(0.0, 1.0); n_var];
                (0..n_obj)
                    .map(|j| max_gradient_norm(surrogate, j, &bounds, &self.optimizer, rng))
                    .collect::<Result<Vec<_>>>()?
            }
            LipschitzMode::Local { .. } => Vec::new(),
        };

        let mut zones = Vec::with_capacity(self.busy.len());
        for (b, centre) in self.busy.iter().enumerate() {
            let lipschitz = match self.mode {
                LipschitzMode::Global => global.clone(),
                LipschitzMode::Local { radius } => {
                    let bounds: Vec<(f64, f64)> = centre
                        .iter()
                        .map(|&c| ((c - radius).max(0.0), (c + radius).min(1.0)))
                        .collect();
                    (0..n_obj)
                        .map(|j| max_gradient_norm(surrogate, j, &bounds, &self.optimizer, rng))
                        .collect::<Result<Vec<_>>>()?
                }
            };
            zones.push(Zone {
                centre: centre.clone(),
                mean: pred.mean[b].clone(),
                std: std[b].clone(),
                lipschitz,
            });
        }
        trace_debug!(busy = zones.len(), mode = ?self.mode, "local penalization fitted");
        self.fitted = Some((zones, y_min));
        Ok(())
    }

    fn evaluate(
        &self,
        surrogate: &dyn SurrogateModel,
        x: &[Vec<f64>],
        gradient: bool,
        hessian: bool,
    ) -> Result<AcquisitionValue> {
        if gradient || hessian {
            return Err(Error::NotImplemented("derivatives of the penalized acquisition"));
        }
        let (zones, y_min) = self.fitted.as_ref().ok_or(Error::NotFitted {
            component: "local penalization",
        })?;
        let base = self.base.evaluate(surrogate, x, false, false)?;
        let f = base
            .f
            .iter()
            .zip(x)
            .map(|(row, xi)| {
                row.iter()
                    .enumerate()
                    .map(|(j, &fb)| {
                        let mut log_value = softplus(-fb).max(LOG_FLOOR).ln();
                        for zone in zones {
                            let dist = xi
                                .iter()
                                .zip(&zone.centre)
                                .map(|(a, b)| (a - b).powi(2))
                                .sum::<f64>()
                                .sqrt();
                            let z = safe_divide(zone.lipschitz[j] * dist + y_min[j] - zone.mean[j], zone.std[j]);
                            log_value += norm_cdf(z).max(LOG_FLOOR).ln();
                        }
                        -log_value
                    })
                    .collect()
            })
            .collect();
        Ok(AcquisitionValue { f, df: None, hf: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::Identity;
    use crate::acquisition::test_support::fitted_gp;

    fn penalized(busy: Vec<Vec<f64>>, mode: LipschitzMode) -> (LocalPenalization, crate::surrogate::GaussianProcess) {
        let (gp, data) = fitted_gp();
        let mut lp = LocalPenalization::new(Box::new(Identity), mode).with_busy_points(busy);
        lp.fit(&gp, &data, &mut fastrand::Rng::with_seed(3)).unwrap();
        (lp, gp)
    }

    #[test]
    fn test_derivatives_not_implemented() {
        let (lp, gp) = penalized(vec![vec![0.5, 0.5]], LipschitzMode::Global);
        assert!(matches!(
            lp.evaluate(&gp, &[vec![0.2, 0.2]], true, false),
            Err(Error::NotImplemented(_))
        ));
        assert!(matches!(
            lp.evaluate(&gp, &[vec![0.2, 0.2]], false, true),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn test_requires_std_from_default() {
        let (lp, _) = penalized(vec![vec![0.5, 0.5]], LipschitzMode::Local { radius: 0.1 });
        assert!(lp.requires_std());
    }

    #[test]
    fn test_without_busy_points_is_transformed_base() {
        let (lp, gp) = penalized(Vec::new(), LipschitzMode::Global);
        let x = vec![vec![0.3, 0.6]];
        let base = Identity.evaluate(&gp, &x, false, false).unwrap().f;
        let got = lp.evaluate(&gp, &x, false, false).unwrap().f;
        for (b, g) in base[0].iter().zip(&got[0]) {
            assert!((g + softplus(-b).ln()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_penalty_is_strongest_at_busy_point() {
        let busy = vec![0.5, 0.5];
        let (lp, gp) = penalized(vec![busy.clone()], LipschitzMode::Global);
        let (plain, _) = penalized(Vec::new(), LipschitzMode::Global);
        for l in lp.lipschitz(0).unwrap() {
            assert!(l.is_finite() && *l >= MIN_LIPSCHITZ);
        }

        let points = vec![busy, vec![0.52, 0.5], vec![0.95, 0.05]];
        let pen = lp.evaluate(&gp, &points, false, false).unwrap().f;
        let base = plain.evaluate(&gp, &points, false, false).unwrap().f;
        let excess: Vec<f64> = pen.iter().zip(&base).map(|(p, b)| p[0] - b[0] + p[1] - b[1]).collect();
        assert!(excess.iter().all(|e| *e >= -1e-12));
        assert!(excess[0] > 0.0);
        assert!(excess[0] >= excess[2]);
    }

    #[test]
    fn test_local_mode_fits_per_point() {
        let (lp, _) = penalized(
            vec![vec![0.2, 0.8], vec![0.7, 0.3]],
            LipschitzMode::Local { radius: 0.1 },
        );
        assert_eq!(lp.mode(), LipschitzMode::Local { radius: 0.1 });
        assert_eq!(lp.busy_points().len(), 2);
        assert_eq!(lp.lipschitz(1).unwrap().len(), 2);
        assert!(lp.lipschitz(2).is_none());
    }

    #[test]
    fn test_busy_point_dimension_checked() {
        let (gp, data) = fitted_gp();
        let mut lp = LocalPenalization::new(Box::new(Identity), LipschitzMode::Global)
            .with_busy_points(vec![vec![0.1, 0.2, 0.3]]);
        assert!(matches!(
            lp.fit(&gp, &data, &mut fastrand::Rng::with_seed(0)),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}

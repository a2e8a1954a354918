//! Projected L-BFGS-B with Armijo backtracking.
//!
//! Box constraints are handled by projecting every trial point onto the
//! bounds and by zeroing gradient components that push against an active
//! bound. This is not the full Cauchy-point L-BFGS-B of Byrd et al., but it
//! behaves well on the smooth, low-dimensional problems used here
//! (kernel hyperparameters, Lipschitz estimation).

/// Settings for [`minimize`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LbfgsConfig {
    /// Maximum number of iterations. Default: 200.
    pub max_iter: usize,
    /// Number of stored correction pairs. Default: 10.
    pub memory: usize,
    /// Projected gradient norm at which to stop. Default: `1e-6`.
    pub gtol: f64,
    /// Relative decrease of the objective at which to stop. Default: `1e-10`.
    pub ftol: f64,
    /// Maximum number of step halvings per line search. Default: 30.
    pub max_backtracks: usize,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            max_iter: 200,
            memory: 10,
            gtol: 1e-6,
            ftol: 1e-10,
            max_backtracks: 30,
        }
    }
}

/// Result of a bounded minimization.
#[derive(Clone, Debug)]
pub struct Minimum {
    /// Best point found (always inside the bounds).
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub fun: f64,
    /// Iterations performed.
    pub n_iter: usize,
    /// Whether a tolerance was reached before `max_iter`.
    pub converged: bool,
}

/// Limited-memory inverse Hessian approximation.
struct History {
    s: Vec<Vec<f64>>,
    y: Vec<Vec<f64>>,
    rho: Vec<f64>,
    capacity: usize,
}

impl History {
    fn new(capacity: usize) -> Self {
        Self {
            s: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            rho: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    fn clear(&mut self) {
        self.s.clear();
        self.y.clear();
        self.rho.clear();
    }

    fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    fn push(&mut self, s: Vec<f64>, y: Vec<f64>) {
        let sy = dot(&s, &y);
        if sy <= 1e-10 {
            return;
        }
        if self.s.len() >= self.capacity {
            self.s.remove(0);
            self.y.remove(0);
            self.rho.remove(0);
        }
        self.rho.push(1.0 / sy);
        self.s.push(s);
        self.y.push(y);
    }

    /// Two-loop recursion: returns `-H g`.
    fn direction(&self, grad: &[f64]) -> Vec<f64> {
        let k = self.s.len();
        if k == 0 {
            return grad.iter().map(|&g| -g).collect();
        }

        let mut q = grad.to_vec();
        let mut alpha = vec![0.0; k];
        for i in (0..k).rev() {
            alpha[i] = self.rho[i] * dot(&self.s[i], &q);
            axpy(-alpha[i], &self.y[i], &mut q);
        }

        let last = k - 1;
        let yy = dot(&self.y[last], &self.y[last]);
        let gamma = if yy > 1e-30 {
            dot(&self.s[last], &self.y[last]) / yy
        } else {
            1.0
        };
        let mut r: Vec<f64> = q.iter().map(|&qi| gamma * qi).collect();

        for i in 0..k {
            let beta = self.rho[i] * dot(&self.y[i], &r);
            axpy(alpha[i] - beta, &self.s[i], &mut r);
        }
        for v in &mut r {
            *v = -*v;
        }
        r
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn axpy(a: f64, x: &[f64], y: &mut [f64]) {
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi += a * xi;
    }
}

pub(crate) fn project(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (v, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *v = v.clamp(lo, hi);
    }
}

/// Gradient with components pointing out of an active bound removed.
fn projected_gradient(x: &[f64], grad: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(grad)
        .zip(bounds)
        .map(|((&xi, &g), &(lo, hi))| {
            if (xi <= lo && g > 0.0) || (xi >= hi && g < 0.0) {
                0.0
            } else {
                g
            }
        })
        .collect()
}

/// Minimize `f` inside `bounds` starting from `x0`.
///
/// `f` returns the objective value and its gradient. Non-finite values are
/// treated as `+∞`, so the line search backs away from them.
pub fn minimize<F>(mut f: F, x0: &[f64], bounds: &[(f64, f64)], config: &LbfgsConfig) -> Minimum
where
    F: FnMut(&[f64]) -> (f64, Vec<f64>),
{
    let mut x = x0.to_vec();
    project(&mut x, bounds);
    let (mut fx, mut grad) = f(&x);
    if !fx.is_finite() || grad.iter().any(|g| !g.is_finite()) {
        return Minimum {
            x,
            fun: if fx.is_nan() { f64::INFINITY } else { fx },
            n_iter: 0,
            converged: false,
        };
    }

    let mut history = History::new(config.memory);
    let mut converged = false;
    let mut n_iter = 0;

    while n_iter < config.max_iter {
        let pg = projected_gradient(&x, &grad, bounds);
        if dot(&pg, &pg).sqrt() < config.gtol {
            converged = true;
            break;
        }

        let mut direction = history.direction(&pg);
        // Keep the step inside the feasible face.
        for ((d, &xi), &(lo, hi)) in direction.iter_mut().zip(&x).zip(bounds) {
            if (xi <= lo && *d < 0.0) || (xi >= hi && *d > 0.0) {
                *d = 0.0;
            }
        }
        if dot(&direction, &pg) >= 0.0 {
            history.clear();
            direction = pg.iter().map(|&g| -g).collect();
        }

        let Some((x_new, f_new, g_new)) = line_search(&mut f, &x, fx, &grad, &direction, bounds, config)
        else {
            if history.is_empty() {
                converged = true;
                break;
            }
            history.clear();
            n_iter += 1;
            continue;
        };

        let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&grad).map(|(a, b)| a - b).collect();
        history.push(s, y);

        let decrease = fx - f_new;
        x = x_new;
        grad = g_new;
        let previous = fx;
        fx = f_new;
        n_iter += 1;

        if decrease <= config.ftol * previous.abs().max(fx.abs()).max(1.0) {
            converged = true;
            break;
        }
    }

    Minimum {
        x,
        fun: fx,
        n_iter,
        converged,
    }
}

fn line_search<F>(
    f: &mut F,
    x: &[f64],
    fx: f64,
    grad: &[f64],
    direction: &[f64],
    bounds: &[(f64, f64)],
    config: &LbfgsConfig,
) -> Option<(Vec<f64>, f64, Vec<f64>)>
where
    F: FnMut(&[f64]) -> (f64, Vec<f64>),
{
    const C1: f64 = 1e-4;
    let mut step = 1.0;
    for _ in 0..config.max_backtracks {
        let mut trial: Vec<f64> = x.iter().zip(direction).map(|(&xi, &d)| xi + step * d).collect();
        project(&mut trial, bounds);
        let moved: Vec<f64> = trial.iter().zip(x).map(|(a, b)| a - b).collect();
        let slope = dot(grad, &moved);
        if dot(&moved, &moved) <= 0.0 {
            return None;
        }
        let (f_trial, g_trial) = f(&trial);
        let sufficient = f_trial <= fx + C1 * slope.min(0.0) && f_trial < fx;
        if sufficient && f_trial.is_finite() && g_trial.iter().all(|g| g.is_finite()) {
            return Some((trial, f_trial, g_trial));
        }
        step *= 0.5;
    }
    None
}

/// Run [`minimize`] from every start and keep the best result.
///
/// Returns `None` when `starts` is empty.
pub fn multistart<F>(
    mut f: F,
    starts: &[Vec<f64>],
    bounds: &[(f64, f64)],
    config: &LbfgsConfig,
) -> Option<Minimum>
where
    F: FnMut(&[f64]) -> (f64, Vec<f64>),
{
    starts
        .iter()
        .map(|x0| minimize(&mut f, x0, bounds, config))
        .min_by(|a, b| a.fun.total_cmp(&b.fun))
}

//! Parallel Tchebycheff-scalarized search.
//!
//! Every weight vector gets its own single-objective L-BFGS-B run on
//! `max_j w_j |F_j(x) - z_j|`, where `z` lies just below the ideal point
//! of the start population. Runs execute on a bounded pool of blocking tasks; each is
//! wrapped in a timeout. A run that fails, panics, or times out does not
//! contribute a candidate.
//!
//! [`ScalarizedSearch`] plugs the solver into a synchronous round as an
//! [`InnerSearch`].

use std::sync::Arc;
use std::time::Duration;

use nalgebra::DMatrix;

use super::{InnerSearch, SearchOutcome, SurrogateProblem};
use crate::acquisition::Acquisition;
use crate::decomposition::reference_directions;
use crate::error::{Error, Result};
use crate::optim::{LbfgsConfig, minimize};
use crate::surrogate::SurrogateModel;

/// Fraction of the start population's range by which `z` undercuts its
/// ideal point.
const IDEAL_MARGIN: f64 = 0.1;

/// Bounded-concurrency scalarized solver.
#[derive(Clone, Debug)]
pub struct ScalarizedSolver {
    max_concurrency: usize,
    timeout: Duration,
    optimizer: LbfgsConfig,
}

impl Default for ScalarizedSolver {
    fn default() -> Self {
        ScalarizedSolverBuilder::new().build()
    }
}

/// Builder for [`ScalarizedSolver`].
#[derive(Clone, Debug, Default)]
pub struct ScalarizedSolverBuilder {
    max_concurrency: Option<usize>,
    timeout: Option<Duration>,
    optimizer: Option<LbfgsConfig>,
}

impl ScalarizedSolverBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of concurrent runs. Default: 4. Minimum 1.
    #[must_use]
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Per-run timeout. Default: 60 seconds.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Settings of each L-BFGS-B run. Default: [`LbfgsConfig::default`].
    #[must_use]
    pub fn optimizer(mut self, config: LbfgsConfig) -> Self {
        self.optimizer = Some(config);
        self
    }

    /// Build the solver.
    #[must_use]
    pub fn build(self) -> ScalarizedSolver {
        ScalarizedSolver {
            max_concurrency: self.max_concurrency.unwrap_or(4).max(1),
            timeout: self.timeout.unwrap_or(Duration::from_secs(60)),
            optimizer: self.optimizer.unwrap_or_default(),
        }
    }
}

/// Tchebycheff value and gradient from acquisition values and gradients.
fn tchebycheff(f: &[f64], df: &DMatrix<f64>, weight: &[f64], ideal: &[f64]) -> (f64, Vec<f64>) {
    let mut best = (f64::NEG_INFINITY, 0_usize);
    for (j, ((v, w), z)) in f.iter().zip(weight).zip(ideal).enumerate() {
        let term = w.max(1e-6) * (v - z).abs();
        if term > best.0 {
            best = (term, j);
        }
    }
    let (value, k) = best;
    let sign = if f[k] >= ideal[k] { 1.0 } else { -1.0 };
    let scale = weight[k].max(1e-6) * sign;
    (value, df.row(k).iter().map(|g| g * scale).collect())
}

fn run_one(
    surrogate: &dyn SurrogateModel,
    acquisition: &dyn Acquisition,
    start: &[f64],
    weight: &[f64],
    ideal: &[f64],
    config: &LbfgsConfig,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let n_var = start.len();
    let bounds = vec![(0.0, 1.0); n_var];
    let mut failure = None;
    let objective = |x: &[f64]| -> (f64, Vec<f64>) {
        match acquisition.evaluate(surrogate, &[x.to_vec()], true, false) {
            Ok(value) => match value.df {
                Some(df) => tchebycheff(&value.f[0], &df[0], weight, ideal),
                None => {
                    failure.get_or_insert(Error::NotImplemented("acquisition gradient"));
                    (f64::INFINITY, vec![0.0; n_var])
                }
            },
            Err(e) => {
                failure.get_or_insert(e);
                (f64::INFINITY, vec![0.0; n_var])
            }
        }
    };
    let minimum = minimize(objective, start, &bounds, config);
    if let Some(e) = failure {
        return Err(e);
    }
    let f = acquisition.evaluate(surrogate, &[minimum.x.clone()], false, false)?.f;
    Ok((minimum.x, f.into_iter().next().unwrap_or_default()))
}

impl ScalarizedSolver {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> ScalarizedSolverBuilder {
        ScalarizedSolverBuilder::new()
    }

    /// Run one scalarized search per weight vector, starting run `i` from
    /// `starts[i % starts.len()]` (normalized designs).
    ///
    /// Results are returned in weight order, skipping failed runs.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `starts` or `weights` is empty,
    /// propagates errors evaluating the start population, and returns
    /// `Error::TaskError` when no run succeeds.
    pub async fn solve(
        &self,
        surrogate: Arc<dyn SurrogateModel>,
        acquisition: Arc<dyn Acquisition>,
        starts: Vec<Vec<f64>>,
        weights: Vec<Vec<f64>>,
    ) -> Result<SearchOutcome> {
        use tokio::sync::Semaphore;
        use tokio::task::JoinSet;

        if starts.is_empty() || weights.is_empty() {
            return Err(Error::InvalidConfig("scalarized solver needs starts and weights".into()));
        }

        let ideal = {
            let (s, a, x) = (Arc::clone(&surrogate), Arc::clone(&acquisition), starts.clone());
            let f = tokio::task::spawn_blocking(move || a.evaluate(s.as_ref(), &x, false, false))
                .await
                .map_err(|e| Error::TaskError(e.to_string()))??
                .f;
            let n_obj = f.first().map_or(0, Vec::len);
            Arc::new(
                (0..n_obj)
                    .map(|j| {
                        let (lo, hi) = f
                            .iter()
                            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| (lo.min(r[j]), hi.max(r[j])));
                        lo - IDEAL_MARGIN * (hi - lo) - 1e-3
                    })
                    .collect::<Vec<f64>>(),
            )
        };
        trace_info!(runs = weights.len(), max_concurrency = self.max_concurrency, "scalarized search started");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set: JoinSet<(usize, Result<(Vec<f64>, Vec<f64>)>)> = JoinSet::new();
        for (i, weight) in weights.into_iter().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::TaskError(e.to_string()))?;
            let start = starts[i % starts.len()].clone();
            let (s, a, z) = (Arc::clone(&surrogate), Arc::clone(&acquisition), Arc::clone(&ideal));
            let config = self.optimizer.clone();
            let timeout = self.timeout;
            join_set.spawn(async move {
                let task = tokio::task::spawn_blocking(move || run_one(s.as_ref(), a.as_ref(), &start, &weight, &z, &config));
                let result = match tokio::time::timeout(timeout, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join)) => Err(Error::TaskError(join.to_string())),
                    Err(_) => Err(Error::TaskError(format!("run timed out after {timeout:?}"))),
                };
                drop(permit);
                (i, result)
            });
        }

        let mut finished = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((i, Ok((x, f)))) => finished.push((i, x, f)),
                #[allow(unused_variables)]
                Ok((run, Err(error))) => {
                    trace_info!(run, error = %error, "scalarized run failed");
                }
                #[allow(unused_variables)]
                Err(error) => {
                    trace_info!(error = %error, "scalarized run panicked");
                }
            }
        }
        if finished.is_empty() {
            return Err(Error::TaskError("every scalarized run failed".into()));
        }
        finished.sort_by_key(|r| r.0);
        trace_info!(succeeded = finished.len(), "scalarized search finished");

        let (x, f) = finished.into_iter().map(|(_, x, f)| (x, f)).unzip();
        Ok(SearchOutcome { x, f, families: None })
    }
}

/// [`InnerSearch`] running a [`ScalarizedSolver`] on a private
/// current-thread runtime.
///
/// Each round uses at least as many evenly spread weight vectors as the
/// initial population holds, and run `i` starts from population member
/// `i`. The generation budget is unused: every run stops on its own
/// L-BFGS-B criteria. The problem must be built with
/// [`SurrogateProblem::shared`], and the search must not be called from
/// inside a tokio runtime.
#[derive(Clone, Debug, Default)]
pub struct ScalarizedSearch {
    solver: ScalarizedSolver,
}

impl ScalarizedSearch {
    /// Wraps `solver`.
    #[must_use]
    pub fn new(solver: ScalarizedSolver) -> Self {
        Self { solver }
    }
}

impl InnerSearch for ScalarizedSearch {
    fn search(
        &self,
        problem: &SurrogateProblem<'_>,
        initial: Vec<Vec<f64>>,
        _n_gen: usize,
        _rng: &mut fastrand::Rng,
    ) -> Result<SearchOutcome> {
        let (surrogate, acquisition) = problem
            .handles()
            .ok_or_else(|| Error::InvalidConfig("scalarized search needs a shared surrogate problem".into()))?;
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::TaskError(
                "scalarized search cannot block inside an async runtime".into(),
            ));
        }
        let weights = reference_directions(problem.n_obj(), initial.len());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| Error::TaskError(e.to_string()))?;
        runtime.block_on(self.solver.solve(surrogate, acquisition, initial, weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::test_support::fitted_gp;
    use crate::acquisition::{ExpectedImprovement, Identity, LipschitzMode, LocalPenalization};
    use crate::decomposition::das_dennis;
    use crate::sampling::latin_hypercube;

    #[test]
    fn test_tchebycheff_gradient_follows_active_term() {
        let df = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let (v, g) = tchebycheff(&[1.0, -2.0], &df, &[0.5, 0.5], &[0.0, 0.0]);
        assert!((v - 1.0).abs() < 1e-12);
        assert_eq!(g, vec![-1.5, -2.0]);
    }

    #[tokio::test]
    async fn test_runs_in_weight_order() {
        let (gp, _) = fitted_gp();
        let surrogate: Arc<dyn SurrogateModel> = Arc::new(gp);
        let mut rng = fastrand::Rng::with_seed(2);
        let starts = latin_hypercube(&mut rng, &[0.0, 0.0], &[1.0, 1.0], 3);
        let weights = das_dennis(2, 4);
        let solver = ScalarizedSolver::builder().max_concurrency(2).build();
        let out = solver
            .solve(surrogate, Arc::new(Identity), starts, weights)
            .await
            .unwrap();
        assert_eq!(out.len(), 5);
        assert!(out.x.iter().flatten().all(|v| (0.0..=1.0).contains(v)));
        assert!(out.f.iter().all(|r| r.len() == 2));
    }

    #[tokio::test]
    async fn test_all_runs_failing_is_an_error() {
        let (gp, data) = fitted_gp();
        let mut penalized = LocalPenalization::new(Box::new(Identity), LipschitzMode::Global);
        penalized.fit(&gp, &data, &mut fastrand::Rng::with_seed(0)).unwrap();
        let solver = ScalarizedSolver::default();
        let result = solver
            .solve(Arc::new(gp), Arc::new(penalized), vec![vec![0.5, 0.5]], das_dennis(2, 2))
            .await;
        assert!(matches!(result, Err(Error::TaskError(_))));
    }

    #[test]
    fn test_search_runs_one_start_per_direction() {
        let (gp, data) = fitted_gp();
        let mut ei = ExpectedImprovement::default();
        ei.fit(&gp, &data, &mut fastrand::Rng::with_seed(0)).unwrap();
        let surrogate: Arc<dyn SurrogateModel> = Arc::new(gp);
        let acquisition: Arc<dyn Acquisition> = Arc::new(ei);
        let problem = SurrogateProblem::shared(&surrogate, &acquisition);

        let mut rng = fastrand::Rng::with_seed(3);
        let initial = latin_hypercube(&mut rng, &[0.0, 0.0], &[1.0, 1.0], 6);
        let search = ScalarizedSearch::new(ScalarizedSolver::builder().max_concurrency(3).build());
        let out = search.search(&problem, initial, 0, &mut rng).unwrap();
        assert_eq!(out.len(), reference_directions(2, 6).len());
        assert!(out.families.is_none());
        assert!(out.x.iter().flatten().all(|v| (0.0..=1.0).contains(v)));
        assert!(out.f.iter().flatten().all(|v| *v <= 1e-12));
    }

    #[test]
    fn test_search_needs_shared_problem() {
        let (gp, _) = fitted_gp();
        let problem = SurrogateProblem::new(&gp, &Identity);
        let result = ScalarizedSearch::default().search(&problem, vec![vec![0.5, 0.5]], 1, &mut fastrand::Rng::with_seed(0));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_search_refuses_to_block_inside_runtime() {
        let (gp, _) = fitted_gp();
        let surrogate: Arc<dyn SurrogateModel> = Arc::new(gp);
        let acquisition: Arc<dyn Acquisition> = Arc::new(Identity);
        let problem = SurrogateProblem::shared(&surrogate, &acquisition);
        let result = ScalarizedSearch::default().search(&problem, vec![vec![0.5, 0.5]], 1, &mut fastrand::Rng::with_seed(0));
        assert!(matches!(result, Err(Error::TaskError(_))));
    }
}

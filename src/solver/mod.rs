//! One optimization round of the inner search.
//!
//! The [`Solver`] builds an initial population from the history, hands the
//! surrogate-backed acquisition to an [`InnerSearch`] engine, and packages
//! the returned population for batch selection. The engine itself is a
//! collaborator: anything that minimizes a vector-valued function over the
//! unit box can implement [`InnerSearch`]. [`Nsga2Search`] is the built-in
//! engine.

mod nsga2;
#[cfg(feature = "async")]
mod parallel;

pub use nsga2::{Nsga2Search, Nsga2SearchBuilder};
#[cfg(feature = "async")]
pub use parallel::{ScalarizedSearch, ScalarizedSolver, ScalarizedSolverBuilder};

use std::sync::Arc;

use crate::acquisition::{Acquisition, AcquisitionValue};
use crate::error::{Error, Result};
use crate::normalization::TrainingSet;
use crate::sampling::InitialSampling;
use crate::surrogate::SurrogateModel;

/// The function the inner search minimizes: acquisition values of the
/// fitted surrogate at normalized designs.
///
/// A problem built with [`SurrogateProblem::shared`] also carries owned
/// handles, for engines that move evaluation onto other threads.
#[derive(Clone)]
pub struct SurrogateProblem<'a> {
    surrogate: &'a dyn SurrogateModel,
    acquisition: &'a dyn Acquisition,
    handles: Option<(Arc<dyn SurrogateModel>, Arc<dyn Acquisition>)>,
}

impl core::fmt::Debug for SurrogateProblem<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SurrogateProblem")
            .field("n_var", &self.n_var())
            .field("n_obj", &self.n_obj())
            .field("shared", &self.handles.is_some())
            .finish()
    }
}

impl<'a> SurrogateProblem<'a> {
    /// Pairs a fitted surrogate with an acquisition fitted on it.
    #[must_use]
    pub fn new(surrogate: &'a dyn SurrogateModel, acquisition: &'a dyn Acquisition) -> Self {
        Self {
            surrogate,
            acquisition,
            handles: None,
        }
    }

    /// Like [`new`](Self::new), keeping clones of the shared handles.
    #[must_use]
    pub fn shared(surrogate: &'a Arc<dyn SurrogateModel>, acquisition: &'a Arc<dyn Acquisition>) -> Self {
        Self {
            surrogate: surrogate.as_ref(),
            acquisition: acquisition.as_ref(),
            handles: Some((Arc::clone(surrogate), Arc::clone(acquisition))),
        }
    }

    /// Owned surrogate and acquisition handles, when the problem was built
    /// with [`shared`](Self::shared).
    #[must_use]
    pub fn handles(&self) -> Option<(Arc<dyn SurrogateModel>, Arc<dyn Acquisition>)> {
        self.handles.clone()
    }

    /// Number of (normalized) design variables.
    #[must_use]
    pub fn n_var(&self) -> usize {
        self.surrogate.n_var()
    }

    /// Number of objectives.
    #[must_use]
    pub fn n_obj(&self) -> usize {
        self.surrogate.n_obj()
    }

    /// Acquisition values at `x`, one row per point.
    ///
    /// # Errors
    ///
    /// Propagates surrogate and acquisition errors.
    pub fn evaluate(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        Ok(self.acquisition.evaluate(self.surrogate, x, false, false)?.f)
    }

    /// Acquisition values with gradients at `x`.
    ///
    /// # Errors
    ///
    /// Propagates surrogate and acquisition errors, including
    /// `Error::NotImplemented` for acquisitions without derivatives.
    pub fn evaluate_with_gradient(&self, x: &[Vec<f64>]) -> Result<AcquisitionValue> {
        self.acquisition.evaluate(self.surrogate, x, true, false)
    }

    /// The fitted surrogate.
    #[must_use]
    pub fn surrogate(&self) -> &'a dyn SurrogateModel {
        self.surrogate
    }
}

/// Population returned by an inner search, in normalized design space.
#[derive(Clone, Debug, Default)]
pub struct SearchOutcome {
    /// Designs.
    pub x: Vec<Vec<f64>>,
    /// Acquisition values of each design.
    pub f: Vec<Vec<f64>>,
    /// Family label of each design, when the engine groups its population.
    pub families: Option<Vec<usize>>,
}

impl SearchOutcome {
    /// Number of designs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Whether the population is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Pads the population to `n` members by resampling with replacement.
    fn pad_to(&mut self, n: usize, rng: &mut fastrand::Rng) {
        let available = self.x.len();
        if available == 0 {
            return;
        }
        while self.x.len() < n {
            let i = rng.usize(0..available);
            self.x.push(self.x[i].clone());
            self.f.push(self.f[i].clone());
            if let Some(families) = self.families.as_mut() {
                families.push(families[i]);
            }
        }
    }
}

/// Engine minimizing the surrogate problem over the unit box.
pub trait InnerSearch: Send + Sync {
    /// Evolve `initial` for `n_gen` generations and return the final
    /// population.
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors from `problem`.
    fn search(
        &self,
        problem: &SurrogateProblem<'_>,
        initial: Vec<Vec<f64>>,
        n_gen: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<SearchOutcome>;
}

/// Settings of one solver round.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverConfig {
    /// How the initial population is built. Default: non-dominated seeding.
    pub initial_sampling: InitialSampling,
    /// Population size. Default: 100.
    pub pop_size: usize,
    /// Generation budget. Default: 10.
    pub n_gen: usize,
    /// Minimum size of the returned population. Default: 10.
    pub batch_size: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            initial_sampling: InitialSampling::default(),
            pop_size: 100,
            n_gen: 10,
            batch_size: 10,
        }
    }
}

/// Runs one inner search per round.
pub struct Solver {
    config: SolverConfig,
    search: Box<dyn InnerSearch>,
}

impl core::fmt::Debug for Solver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Solver").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Default for Solver {
    fn default() -> Self {
        SolverBuilder::new().build()
    }
}

/// Builder for [`Solver`].
#[derive(Default)]
pub struct SolverBuilder {
    config: SolverConfig,
    search: Option<Box<dyn InnerSearch>>,
}

impl SolverBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial population strategy. Default: non-dominated seeding.
    #[must_use]
    pub fn initial_sampling(mut self, sampling: InitialSampling) -> Self {
        self.config.initial_sampling = sampling;
        self
    }

    /// Population size. Default: 100.
    #[must_use]
    pub fn pop_size(mut self, n: usize) -> Self {
        self.config.pop_size = n;
        self
    }

    /// Generation budget. Default: 10.
    #[must_use]
    pub fn n_gen(mut self, n: usize) -> Self {
        self.config.n_gen = n;
        self
    }

    /// Minimum size of the returned population. Default: 10.
    #[must_use]
    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    /// Inner search engine. Default: [`Nsga2Search`] without families.
    #[must_use]
    pub fn search(mut self, search: Box<dyn InnerSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Build the solver.
    #[must_use]
    pub fn build(self) -> Solver {
        Solver {
            config: self.config,
            search: self.search.unwrap_or_else(|| Box::new(Nsga2Search::default())),
        }
    }
}

impl Solver {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> SolverBuilder {
        SolverBuilder::new()
    }

    /// The round settings.
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Run one round on `problem`, seeded from the normalized history in
    /// `data`.
    ///
    /// The returned population holds at least `batch_size` designs.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for a zero population size and
    /// propagates sampling and search errors.
    pub fn solve(
        &self,
        problem: &SurrogateProblem<'_>,
        data: &TrainingSet,
        rng: &mut fastrand::Rng,
    ) -> Result<SearchOutcome> {
        if self.config.pop_size == 0 {
            return Err(Error::InvalidConfig("population size must be positive".into()));
        }
        let n_var = problem.n_var();
        let lower = vec![0.0; n_var];
        let upper = vec![1.0; n_var];
        let history = (!data.is_empty()).then_some((data.x.as_slice(), data.y.as_slice()));
        let initial = self
            .config
            .initial_sampling
            .sample(rng, &lower, &upper, self.config.pop_size, history)?;
        trace_info!(pop_size = initial.len(), n_gen = self.config.n_gen, "inner search started");

        let mut outcome = self.search.search(problem, initial, self.config.n_gen, rng)?;
        if outcome.is_empty() {
            return Err(Error::InvalidConfig("inner search returned an empty population".into()));
        }
        outcome.pad_to(self.config.batch_size, rng);
        trace_info!(population = outcome.len(), "inner search finished");
        Ok(outcome)
    }
}

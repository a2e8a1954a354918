//! Round orchestration.
//!
//! [`Mobo`] turns the evaluated history of a [`Problem`] into the next batch
//! of designs:
//!
//! 1. encode raw designs into the continuous space;
//! 2. fit the normalization on the encoded history;
//! 3. fit the surrogate, then the acquisition;
//! 4. run the inner search on the acquisition;
//! 5. select a batch and decode it back to raw designs.
//!
//! Normalization and surrogate are rebuilt every round. The selection
//! strategy (and any Pareto buffer it owns) persists across rounds.

use core::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::acquisition::{Acquisition, AcquisitionKind};
use crate::decomposition::Decomposition;
use crate::design::ParamValue;
use crate::error::{Error, Result, check_dim};
use crate::normalization::Normalization;
use crate::pareto::pareto_front_indices;
use crate::problem::Problem;
use crate::sampling::InitialSampling;
use crate::selection::{
    ClusterSelection, HypervolumeSelection, ParetoBuffer, Selection, SelectionContext, SelectionInfo,
    SelectionKind,
};
use crate::solver::{InnerSearch, Nsga2Search, Solver, SurrogateProblem};
use crate::surrogate::{EvalRequest, Prediction, SurrogateKind, SurrogateModel};
use crate::types::Dataset;

/// Named combination of surrogate, acquisition, inner search and selection.
///
/// | Preset | Surrogate | Acquisition | Selection |
/// |---|---|---|---|
/// | `dgemo` | GP | identity | hypervolume over families, Pareto buffer |
/// | `tsemo` | GP | Thompson sampling | hypervolume |
/// | `usemo-ei` | GP | EI | uncertainty |
/// | `moead-ego` | GP | EI | Tchebycheff clusters |
/// | `parego` | GP | EI | weighted-sum clusters |
///
/// With the `async` feature, `parego` replaces NSGA-II with
/// [`ScalarizedSearch`](crate::solver::ScalarizedSearch): one L-BFGS-B run
/// per weight vector, in parallel.
/// | `random` | GP | identity | random |
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AlgorithmPreset {
    /// Diversity-guided search over families of the predicted front.
    #[default]
    Dgemo,
    /// Thompson sampling with hypervolume selection.
    Tsemo,
    /// Expected improvement with uncertainty selection.
    UsemoEi,
    /// Expected improvement with decomposition clusters.
    MoeadEgo,
    /// Expected improvement with weighted-sum clusters.
    Parego,
    /// Random batch from the surrogate's predicted front.
    Random,
}

impl FromStr for AlgorithmPreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "dgemo" => Ok(Self::Dgemo),
            "tsemo" => Ok(Self::Tsemo),
            "usemo-ei" => Ok(Self::UsemoEi),
            "moead-ego" => Ok(Self::MoeadEgo),
            "parego" => Ok(Self::Parego),
            "random" => Ok(Self::Random),
            other => Err(Error::UnsupportedConfiguration(format!(
                "unknown algorithm '{other}'"
            ))),
        }
    }
}

impl AlgorithmPreset {
    /// Number of design families labelled by the inner search for presets
    /// that select across families.
    const FAMILIES: usize = 8;

    fn acquisition(self) -> AcquisitionKind {
        match self {
            Self::Dgemo | Self::Random => AcquisitionKind::Identity,
            Self::Tsemo => AcquisitionKind::ThompsonSampling,
            Self::UsemoEi | Self::MoeadEgo | Self::Parego => AcquisitionKind::ExpectedImprovement,
        }
    }

    fn search(self) -> Box<dyn InnerSearch> {
        match self {
            Self::Dgemo => Box::new(Nsga2Search::builder().n_families(Self::FAMILIES).build()),
            #[cfg(feature = "async")]
            Self::Parego => Box::new(crate::solver::ScalarizedSearch::default()),
            _ => Box::new(Nsga2Search::default()),
        }
    }

    fn selection(self, n_obj: usize) -> Result<Box<dyn Selection>> {
        Ok(match self {
            Self::Dgemo if (2..=3).contains(&n_obj) => {
                Box::new(HypervolumeSelection::new().with_buffer(ParetoBuffer::builder(n_obj).build()?))
            }
            Self::Dgemo | Self::Tsemo => Box::new(HypervolumeSelection::new()),
            Self::UsemoEi => SelectionKind::Uncertainty.build(),
            Self::MoeadEgo => Box::new(ClusterSelection::new(Decomposition::Tchebycheff)),
            Self::Parego => Box::new(ClusterSelection::new(Decomposition::WeightedSum)),
            Self::Random => SelectionKind::Random.build(),
        })
    }
}

/// Settings of a [`Mobo`] optimizer.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoboConfig {
    /// Surrogate family. Default: Gaussian process with Matérn 5/2 kernel.
    pub surrogate: SurrogateKind,
    /// Acquisition function. Default: identity.
    pub acquisition: AcquisitionKind,
    /// Designs per proposed batch. Default: 10.
    pub batch_size: usize,
    /// Hypervolume reference point in raw objective units. Default: derived
    /// from the known front each round.
    pub reference_point: Option<Vec<f64>>,
}

impl Default for MoboConfig {
    fn default() -> Self {
        Self {
            surrogate: SurrogateKind::default(),
            acquisition: AcquisitionKind::default(),
            batch_size: 10,
            reference_point: None,
        }
    }
}

/// One proposed batch.
#[derive(Clone, Debug)]
pub struct Proposal {
    /// Raw designs, exactly `batch_size` of them.
    pub x: Vec<Vec<ParamValue>>,
    /// Selection metadata.
    pub info: SelectionInfo,
}

struct Fitted {
    normalization: Normalization,
    surrogate: Arc<dyn SurrogateModel>,
}

struct RoundState {
    rng: fastrand::Rng,
    selection: Box<dyn Selection>,
    fitted: Option<Fitted>,
    rounds: usize,
}

/// Surrogate-assisted batch optimizer for a [`Problem`].
///
/// # Examples
///
/// ```
/// use mobo_core::design::{DesignSpace, ParamValue};
/// use mobo_core::optimizer::Mobo;
/// use mobo_core::problem::SimpleProblem;
/// use mobo_core::types::Dataset;
///
/// let space = DesignSpace::continuous(2, 0.0, 1.0).unwrap();
/// let problem = SimpleProblem::new(space, 2);
/// let mobo = Mobo::builder(problem).batch_size(4).pop_size(20).n_gen(2).seed(7).build().unwrap();
///
/// let mut data = Dataset::default();
/// for i in 0..8 {
///     let t = f64::from(i) / 7.0;
///     let x = vec![ParamValue::Float(t), ParamValue::Float(1.0 - t * t)];
///     data.push(x, vec![t, (1.0 - t).powi(2)]).unwrap();
/// }
///
/// let proposal = mobo.propose(&data).unwrap();
/// assert_eq!(proposal.x.len(), 4);
/// ```
pub struct Mobo<P: Problem> {
    problem: P,
    config: MoboConfig,
    solver: Solver,
    state: Mutex<RoundState>,
}

impl<P: Problem> core::fmt::Debug for Mobo<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mobo")
            .field("config", &self.config)
            .field("solver", &self.solver)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Mobo`].
pub struct MoboBuilder<P: Problem> {
    problem: P,
    config: MoboConfig,
    preset: Option<AlgorithmPreset>,
    surrogate: Option<SurrogateKind>,
    acquisition: Option<AcquisitionKind>,
    selection: Option<Box<dyn Selection>>,
    search: Option<Box<dyn InnerSearch>>,
    initial_sampling: Option<InitialSampling>,
    pop_size: Option<usize>,
    n_gen: Option<usize>,
    seed: Option<u64>,
}

impl<P: Problem> MoboBuilder<P> {
    /// Creates a builder for `problem` with default settings.
    #[must_use]
    pub fn new(problem: P) -> Self {
        Self {
            problem,
            config: MoboConfig::default(),
            preset: None,
            surrogate: None,
            acquisition: None,
            selection: None,
            search: None,
            initial_sampling: None,
            pop_size: None,
            n_gen: None,
            seed: None,
        }
    }

    /// Start from a named preset. Explicit settings override it.
    /// Default: [`AlgorithmPreset::Dgemo`].
    #[must_use]
    pub fn preset(mut self, preset: AlgorithmPreset) -> Self {
        self.preset = Some(preset);
        self
    }

    /// Surrogate family.
    #[must_use]
    pub fn surrogate(mut self, kind: SurrogateKind) -> Self {
        self.surrogate = Some(kind);
        self
    }

    /// Acquisition function.
    #[must_use]
    pub fn acquisition(mut self, kind: AcquisitionKind) -> Self {
        self.acquisition = Some(kind);
        self
    }

    /// Selection strategy.
    #[must_use]
    pub fn selection(mut self, selection: Box<dyn Selection>) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Inner search engine.
    #[must_use]
    pub fn search(mut self, search: Box<dyn InnerSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Initial population strategy of the inner search. Default:
    /// non-dominated seeding.
    #[must_use]
    pub fn initial_sampling(mut self, sampling: InitialSampling) -> Self {
        self.initial_sampling = Some(sampling);
        self
    }

    /// Inner search population size. Default: 100.
    #[must_use]
    pub fn pop_size(mut self, n: usize) -> Self {
        self.pop_size = Some(n);
        self
    }

    /// Inner search generation budget. Default: 10.
    #[must_use]
    pub fn n_gen(mut self, n: usize) -> Self {
        self.n_gen = Some(n);
        self
    }

    /// Designs per batch. Default: 10.
    #[must_use]
    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    /// Hypervolume reference point in raw objective units.
    #[must_use]
    pub fn reference_point(mut self, point: Vec<f64>) -> Self {
        self.config.reference_point = Some(point);
        self
    }

    /// Seed of the optimizer's random source. Default: random.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the optimizer.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if the reference point does not
    /// have one value per objective, `Error::InvalidConfig` for a zero batch
    /// size, and buffer construction errors of the preset.
    pub fn build(self) -> Result<Mobo<P>> {
        let n_obj = self.problem.n_obj();
        if let Some(point) = &self.config.reference_point {
            check_dim("reference point", n_obj, point.len())?;
        }
        if self.config.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be positive".into()));
        }

        let preset = self.preset.unwrap_or_default();
        let config = MoboConfig {
            surrogate: self.surrogate.unwrap_or_default(),
            acquisition: self.acquisition.unwrap_or_else(|| preset.acquisition()),
            ..self.config
        };
        let selection = match self.selection {
            Some(selection) => selection,
            None => preset.selection(n_obj)?,
        };

        let mut solver = Solver::builder()
            .batch_size(config.batch_size)
            .search(self.search.unwrap_or_else(|| preset.search()));
        if let Some(sampling) = self.initial_sampling {
            solver = solver.initial_sampling(sampling);
        }
        if let Some(n) = self.pop_size {
            solver = solver.pop_size(n);
        }
        if let Some(n) = self.n_gen {
            solver = solver.n_gen(n);
        }

        let rng = self.seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        Ok(Mobo {
            problem: self.problem,
            config,
            solver: solver.build(),
            state: Mutex::new(RoundState {
                rng,
                selection,
                fitted: None,
                rounds: 0,
            }),
        })
    }
}

impl<P: Problem> Mobo<P> {
    /// Returns a builder for `problem`.
    #[must_use]
    pub fn builder(problem: P) -> MoboBuilder<P> {
        MoboBuilder::new(problem)
    }

    /// The problem being optimized.
    #[must_use]
    pub fn problem(&self) -> &P {
        &self.problem
    }

    /// The optimizer settings.
    #[must_use]
    pub fn config(&self) -> &MoboConfig {
        &self.config
    }

    /// Number of completed rounds.
    #[must_use]
    pub fn rounds(&self) -> usize {
        self.state.lock().rounds
    }

    /// Propose the next batch from the evaluated history in `data`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyDataset` for an empty history,
    /// `Error::DimensionMismatch` if the objective count disagrees with the
    /// problem, and propagates errors of every component of the round.
    pub fn propose(&self, data: &Dataset) -> Result<Proposal> {
        data.require_non_empty()?;
        let n_obj = self.problem.n_obj();
        check_dim("objective values", n_obj, data.n_obj().unwrap_or(0))?;

        let mut state = self.state.lock();
        let RoundState { rng, selection, fitted, rounds } = &mut *state;

        let x = self.problem.encode(data.x())?;
        let y = data.y();
        let (lower, upper) = self.problem.var_bounds();
        let mut normalization = Normalization::with_bounds(lower, upper)?;
        normalization.fit(&x, y)?;
        let train = normalization.training_set(&x, y)?;

        let mut surrogate = self.config.surrogate.build();
        surrogate.fit(&train, rng)?;
        let mut acquisition: Box<dyn Acquisition> = self.config.acquisition.build();
        acquisition.fit(surrogate.as_ref(), &train, rng)?;
        let surrogate: Arc<dyn SurrogateModel> = Arc::from(surrogate);
        let acquisition: Arc<dyn Acquisition> = Arc::from(acquisition);

        let outcome = {
            let problem = SurrogateProblem::shared(&surrogate, &acquisition);
            self.solver.solve(&problem, &train, rng)?
        };

        let front = pareto_front_indices(y);
        let pareto_x: Vec<Vec<f64>> = front.iter().map(|&i| x[i].clone()).collect();
        let pareto_y: Vec<Vec<f64>> = front.iter().map(|&i| y[i].clone()).collect();
        let ctx = SelectionContext {
            surrogate: surrogate.as_ref(),
            normalization: &normalization,
            pareto_x: &pareto_x,
            pareto_y: &pareto_y,
            reference_point: self.config.reference_point.as_deref(),
        };
        let selected = selection.select(&outcome, &ctx, self.config.batch_size, rng)?;
        let decoded = self.problem.decode(&selected.x)?;

        *fitted = Some(Fitted { normalization, surrogate });
        *rounds += 1;
        trace_info!(round = *rounds, batch = decoded.len(), history = data.len(), "round complete");

        Ok(Proposal {
            x: decoded,
            info: selected.info,
        })
    }

    /// Surrogate mean (and std, when the surrogate has one) at raw designs,
    /// in raw objective units, from the model fitted in the last round.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before the first [`propose`](Self::propose)
    /// and propagates encoding and surrogate errors.
    pub fn predict(&self, x: &[Vec<ParamValue>]) -> Result<Prediction> {
        let state = self.state.lock();
        let fitted = state.fitted.as_ref().ok_or(Error::NotFitted { component: "optimizer" })?;
        let encoded = self.problem.encode(x)?;
        let normalized = fitted.normalization.do_x(&encoded)?;
        let request = match self.config.surrogate {
            SurrogateKind::NeuralNetwork => EvalRequest::mean(),
            _ => EvalRequest::mean().with_std(),
        };
        fitted.surrogate.evaluate(&normalized, request)
    }
}

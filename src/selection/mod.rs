//! Batch selection: choosing which candidates to evaluate next.
//!
//! Every strategy receives the inner search's population (normalized
//! designs with acquisition values and optional family labels) and returns
//! exactly `batch_size` designs in raw continuous units.
//!
//! | Strategy | Rule |
//! |---|---|
//! | [`RandomSelection`] | Uniform sample without replacement |
//! | [`UncertaintySelection`] | Largest product of predicted std |
//! | [`ClusterSelection`] | Best scalarized member of each k-means cluster |
//! | [`HypervolumeSelection`] | Greedy hypervolume gain, cycling over families |
//!
//! [`ParetoBuffer`] and the [`graph`] module provide the sparse Pareto-front
//! approximation used by [`HypervolumeSelection`] when a buffer is attached.

mod buffer;
mod cluster;
mod family;
pub mod graph;
mod random;
mod uncertainty;

use core::str::FromStr;

pub use buffer::{BufferEntry, ParetoBuffer, ParetoBufferBuilder, SparseApproximation};
pub use cluster::ClusterSelection;
pub use family::HypervolumeSelection;
pub use random::RandomSelection;
pub use uncertainty::UncertaintySelection;

use crate::error::{Error, Result};
use crate::normalization::Normalization;
use crate::solver::SearchOutcome;
use crate::surrogate::SurrogateModel;

/// Round state available to a selection strategy.
#[derive(Clone, Copy)]
pub struct SelectionContext<'a> {
    /// The fitted surrogate (normalized inputs, raw outputs).
    pub surrogate: &'a dyn SurrogateModel,
    /// The fitted normalization of this round.
    pub normalization: &'a Normalization,
    /// Current Pareto set, raw continuous designs.
    pub pareto_x: &'a [Vec<f64>],
    /// Current Pareto front, raw objective values.
    pub pareto_y: &'a [Vec<f64>],
    /// Reference point for hypervolume, raw objective units.
    pub reference_point: Option<&'a [f64]>,
}

impl core::fmt::Debug for SelectionContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SelectionContext")
            .field("pareto_size", &self.pareto_y.len())
            .field("reference_point", &self.reference_point)
            .finish_non_exhaustive()
    }
}

/// Metadata attached to a selected batch.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectionInfo {
    /// Index of each selected design in the candidate population.
    pub indices: Vec<usize>,
    /// Family label of each selected design, if the population had any.
    pub families: Option<Vec<usize>>,
    /// Approximate Pareto front (raw objective units), if computed.
    pub approx_front: Option<Vec<Vec<f64>>>,
}

/// A selected batch.
#[derive(Clone, Debug, Default)]
pub struct Selected {
    /// Raw continuous designs, exactly `batch_size` of them.
    pub x: Vec<Vec<f64>>,
    /// Metadata.
    pub info: SelectionInfo,
}

/// Contract shared by every selection strategy.
pub trait Selection: Send {
    /// Choose `batch_size` designs from `candidates`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyDataset` for an empty population and propagates
    /// surrogate and normalization errors.
    fn select(
        &mut self,
        candidates: &SearchOutcome,
        ctx: &SelectionContext<'_>,
        batch_size: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<Selected>;
}

/// Selection strategy chosen by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectionKind {
    /// Uniform random.
    Random,
    /// Largest predicted uncertainty.
    Uncertainty,
    /// Decomposition-based clustering.
    Cluster,
    /// Greedy hypervolume with family cycling.
    #[default]
    Hypervolume,
}

impl FromStr for SelectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "uncertainty" => Ok(Self::Uncertainty),
            "cluster" | "moead" => Ok(Self::Cluster),
            "hypervolume" | "hvi" | "dgemo" => Ok(Self::Hypervolume),
            other => Err(Error::UnsupportedConfiguration(format!(
                "unknown selection '{other}'"
            ))),
        }
    }
}

impl SelectionKind {
    /// A strategy of this kind with default settings.
    #[must_use]
    pub fn build(self) -> Box<dyn Selection> {
        match self {
            Self::Random => Box::new(RandomSelection),
            Self::Uncertainty => Box::new(UncertaintySelection),
            Self::Cluster => Box::new(ClusterSelection::default()),
            Self::Hypervolume => Box::new(HypervolumeSelection::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Package `indices` of the population as a raw-unit batch.
pub(crate) fn finish(
    candidates: &SearchOutcome,
    ctx: &SelectionContext<'_>,
    indices: Vec<usize>,
    approx_front: Option<Vec<Vec<f64>>>,
) -> Result<Selected> {
    let normalized: Vec<Vec<f64>> = indices.iter().map(|&i| candidates.x[i].clone()).collect();
    let x = ctx.normalization.undo_x(&normalized)?;
    let families = candidates
        .families
        .as_ref()
        .map(|f| indices.iter().map(|&i| f[i]).collect());
    trace_info!(batch = indices.len(), "batch selected");
    Ok(Selected {
        x,
        info: SelectionInfo {
            indices,
            families,
            approx_front,
        },
    })
}

pub(crate) fn require_candidates(candidates: &SearchOutcome) -> Result<()> {
    if candidates.is_empty() { Err(Error::EmptyDataset) } else { Ok(()) }
}

/// Top up `indices` to `batch_size` with random population members,
/// preferring members not yet chosen.
pub(crate) fn fill_random(indices: &mut Vec<usize>, n: usize, batch_size: usize, rng: &mut fastrand::Rng) {
    let mut unused: Vec<usize> = (0..n).filter(|i| !indices.contains(i)).collect();
    while indices.len() < batch_size {
        if unused.is_empty() {
            indices.push(rng.usize(0..n));
        } else {
            indices.push(unused.swap_remove(rng.usize(0..unused.len())));
        }
    }
}

//! Family-aware greedy hypervolume batch.

use std::collections::BTreeSet;

use super::graph::{IteratedConditionalModes, LabelOptimizer};
use super::{ParetoBuffer, Selected, Selection, SelectionContext, finish, require_candidates};
use crate::error::{Result, check_dim};
use crate::pareto::hypervolume_contribution;
use crate::solver::SearchOutcome;
use crate::surrogate::EvalRequest;

/// Greedy hypervolume selection that cycles through families.
///
/// Each pick is the unvisited candidate whose predicted objectives add the
/// most hypervolume to the current front (known front plus earlier picks).
/// Picking a candidate marks its whole family visited; once every family
/// has been visited the cycle restarts. When no candidate adds volume, the
/// pick is uniform among the unvisited ones.
///
/// Without family labels every candidate is its own family. A pool smaller
/// than the batch is padded by repeating the first pick.
///
/// With a [`ParetoBuffer`] attached, predictions are accumulated in the
/// buffer across rounds and the pool is narrowed to this round's members of
/// its sparse approximation, which is also reported as the approximate
/// front.
pub struct HypervolumeSelection {
    buffer: Option<ParetoBuffer>,
    label_optimizer: Box<dyn LabelOptimizer>,
}

impl core::fmt::Debug for HypervolumeSelection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HypervolumeSelection")
            .field("buffer", &self.buffer.as_ref().map(ParetoBuffer::len))
            .finish_non_exhaustive()
    }
}

impl Default for HypervolumeSelection {
    fn default() -> Self {
        Self {
            buffer: None,
            label_optimizer: Box::new(IteratedConditionalModes::default()),
        }
    }
}

impl HypervolumeSelection {
    /// Selection without a buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a Pareto buffer.
    #[must_use]
    pub fn with_buffer(mut self, buffer: ParetoBuffer) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Replace the label optimizer used by the sparse approximation.
    /// Default: [`IteratedConditionalModes`].
    #[must_use]
    pub fn with_label_optimizer(mut self, optimizer: Box<dyn LabelOptimizer>) -> Self {
        self.label_optimizer = optimizer;
        self
    }

    /// The attached buffer, if any.
    #[must_use]
    pub fn buffer(&self) -> Option<&ParetoBuffer> {
        self.buffer.as_ref()
    }
}

/// Reference point just beyond the worst known value of each objective.
fn fallback_reference(known: &[Vec<f64>], n_obj: usize) -> Vec<f64> {
    (0..n_obj)
        .map(|j| {
            let (lo, hi) = known
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| (lo.min(r[j]), hi.max(r[j])));
            let range = hi - lo;
            if range > 0.0 { hi + 0.1 * range } else { hi + 1.0 }
        })
        .collect()
}

impl Selection for HypervolumeSelection {
    fn select(
        &mut self,
        candidates: &SearchOutcome,
        ctx: &SelectionContext<'_>,
        batch_size: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<Selected> {
        require_candidates(candidates)?;
        let n = candidates.len();
        let y = ctx.surrogate.evaluate(&candidates.x, EvalRequest::mean())?.mean;
        let n_obj = y[0].len();
        let families: Vec<usize> = candidates.families.clone().unwrap_or_else(|| (0..n).collect());

        let mut pool: Vec<usize> = (0..n).collect();
        let mut approx_front = None;
        if let Some(buffer) = self.buffer.as_mut() {
            let raw_x = ctx.normalization.undo_x(&candidates.x)?;
            buffer.insert(&raw_x, &y, &families)?;
            let approx = buffer.sparse_approximation(self.label_optimizer.as_ref())?;
            // The batch is drawn from this round's candidates that survive in
            // the sparse approximation. Entries kept from earlier rounds have
            // no prediction from this round's surrogate and no index into
            // `candidates`, so they only shape the reported front. If none of
            // this round's candidates survive, the whole population stays
            // eligible.
            let members: Vec<usize> = pool
                .iter()
                .copied()
                .filter(|&i| approx.x.iter().any(|a| a == &raw_x[i]))
                .collect();
            if !members.is_empty() {
                pool = members;
            }
            approx_front = Some(approx.y);
        }

        let reference = match ctx.reference_point {
            Some(r) => r.to_vec(),
            None if ctx.pareto_y.is_empty() => fallback_reference(&y, n_obj),
            None => fallback_reference(ctx.pareto_y, n_obj),
        };
        check_dim("reference point", n_obj, reference.len())?;

        let mut front: Vec<Vec<f64>> = ctx.pareto_y.to_vec();
        let mut visited: BTreeSet<usize> = BTreeSet::new();
        let mut taken = vec![false; n];
        let mut indices = Vec::with_capacity(batch_size);
        while indices.len() < batch_size {
            let open: Vec<usize> = pool
                .iter()
                .copied()
                .filter(|&i| !taken[i] && !visited.contains(&families[i]))
                .collect();
            if open.is_empty() {
                if visited.is_empty() {
                    break;
                }
                visited.clear();
                continue;
            }

            let mut best = (0.0_f64, None);
            for &i in &open {
                let gain = hypervolume_contribution(&front, &y[i], &reference);
                if gain > best.0 {
                    best = (gain, Some(i));
                }
            }
            let pick = best.1.unwrap_or_else(|| open[rng.usize(0..open.len())]);
            taken[pick] = true;
            visited.insert(families[pick]);
            front.push(y[pick].clone());
            indices.push(pick);
        }

        if let Some(&first) = indices.first() {
            indices.resize(batch_size, first);
        }
        finish(candidates, ctx, indices, approx_front)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::test_support::round;

    #[test]
    fn test_families_distinct_within_cycle() {
        let (gp, norm, pop) = round();
        let ctx = SelectionContext {
            surrogate: &gp,
            normalization: &norm,
            pareto_x: &[],
            pareto_y: &[],
            reference_point: None,
        };
        let out = HypervolumeSelection::new()
            .select(&pop, &ctx, 6, &mut fastrand::Rng::with_seed(9))
            .unwrap();
        assert_eq!(out.x.len(), 6);
        let families = out.info.families.unwrap();
        let first_cycle: BTreeSet<usize> = families[..4].iter().copied().collect();
        assert_eq!(first_cycle.len(), 4);
        assert_ne!(families[4], families[5]);
        let mut idx = out.info.indices.clone();
        idx.sort_unstable();
        idx.dedup();
        assert_eq!(idx.len(), 6);
    }

    #[test]
    fn test_small_pool_repeats_first_pick() {
        let (gp, norm, mut pop) = round();
        pop.x.truncate(2);
        pop.f.truncate(2);
        pop.families = None;
        let ctx = SelectionContext {
            surrogate: &gp,
            normalization: &norm,
            pareto_x: &[],
            pareto_y: &[],
            reference_point: None,
        };
        let out = HypervolumeSelection::new()
            .select(&pop, &ctx, 5, &mut fastrand::Rng::with_seed(1))
            .unwrap();
        let first = out.info.indices[0];
        assert_eq!(&out.info.indices[2..], &[first; 3]);
        assert_eq!(out.x.len(), 5);
    }

    #[test]
    fn test_reference_point_dimension_checked() {
        let (gp, norm, pop) = round();
        let reference = [1.0, 1.0, 1.0];
        let ctx = SelectionContext {
            surrogate: &gp,
            normalization: &norm,
            pareto_x: &[],
            pareto_y: &[],
            reference_point: Some(&reference),
        };
        let result = HypervolumeSelection::new().select(&pop, &ctx, 2, &mut fastrand::Rng::with_seed(1));
        assert!(matches!(result, Err(crate::error::Error::DimensionMismatch { .. })));
    }

    #[test]
    fn test_buffer_reports_approximate_front() {
        let (gp, norm, pop) = round();
        let buffer = ParetoBuffer::builder(2).cell_num(8).cell_capacity(2).build().unwrap();
        let mut selection = HypervolumeSelection::new().with_buffer(buffer);
        let ctx = SelectionContext {
            surrogate: &gp,
            normalization: &norm,
            pareto_x: &[],
            pareto_y: &[],
            reference_point: None,
        };
        let out = selection.select(&pop, &ctx, 3, &mut fastrand::Rng::with_seed(4)).unwrap();
        assert_eq!(out.x.len(), 3);
        let front = out.info.approx_front.unwrap();
        assert!(!front.is_empty());
        assert!(front.len() <= 8);
        assert!(!selection.buffer().unwrap().is_empty());
    }
}

//! Uniform random batch.

use super::{Selected, Selection, SelectionContext, fill_random, finish, require_candidates};
use crate::error::Result;
use crate::solver::SearchOutcome;

/// Uniform sample of the population without replacement.
///
/// A population smaller than the batch is repeated at random.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSelection;

impl Selection for RandomSelection {
    fn select(
        &mut self,
        candidates: &SearchOutcome,
        ctx: &SelectionContext<'_>,
        batch_size: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<Selected> {
        require_candidates(candidates)?;
        let mut indices = Vec::with_capacity(batch_size);
        fill_random(&mut indices, candidates.len(), batch_size, rng);
        finish(candidates, ctx, indices, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::test_support::round;

    #[test]
    fn test_distinct_indices() {
        let (gp, norm, pop) = round();
        let ctx = SelectionContext {
            surrogate: &gp,
            normalization: &norm,
            pareto_x: &[],
            pareto_y: &[],
            reference_point: None,
        };
        let out = RandomSelection.select(&pop, &ctx, 5, &mut fastrand::Rng::with_seed(1)).unwrap();
        assert_eq!(out.x.len(), 5);
        let mut idx = out.info.indices.clone();
        idx.sort_unstable();
        idx.dedup();
        assert_eq!(idx.len(), 5);
        assert_eq!(out.info.families.unwrap().len(), 5);
    }
}

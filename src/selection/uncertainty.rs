//! Uncertainty-driven batch.

use super::{Selected, Selection, SelectionContext, fill_random, finish, require_candidates};
use crate::error::Result;
use crate::solver::SearchOutcome;
use crate::surrogate::EvalRequest;

/// Candidates ranked by the product of their per-objective predicted std,
/// largest first. Ties keep population order.
#[derive(Clone, Copy, Debug, Default)]
pub struct UncertaintySelection;

impl Selection for UncertaintySelection {
    fn select(
        &mut self,
        candidates: &SearchOutcome,
        ctx: &SelectionContext<'_>,
        batch_size: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<Selected> {
        require_candidates(candidates)?;
        let pred = ctx.surrogate.evaluate(&candidates.x, EvalRequest::mean().with_std())?;
        let std = pred.require_std()?;
        let mut order: Vec<(usize, f64)> = std
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.iter().product::<f64>()))
            .collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1));
        let mut indices: Vec<usize> = order.into_iter().take(batch_size).map(|(i, _)| i).collect();
        fill_random(&mut indices, candidates.len(), batch_size, rng);
        finish(candidates, ctx, indices, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::test_support::round;
    use crate::surrogate::SurrogateModel;

    #[test]
    fn test_batch_has_highest_uncertainty() {
        let (gp, norm, pop) = round();
        let ctx = SelectionContext {
            surrogate: &gp,
            normalization: &norm,
            pareto_x: &[],
            pareto_y: &[],
            reference_point: None,
        };
        let out = UncertaintySelection.select(&pop, &ctx, 3, &mut fastrand::Rng::with_seed(1)).unwrap();
        let std = gp.evaluate(&pop.x, EvalRequest::mean().with_std()).unwrap().std.unwrap();
        let product = |i: usize| std[i][0] * std[i][1];
        let lowest_chosen = out.info.indices.iter().map(|&i| product(i)).fold(f64::INFINITY, f64::min);
        for i in (0..pop.len()).filter(|i| !out.info.indices.contains(i)) {
            assert!(product(i) <= lowest_chosen);
        }
    }
}

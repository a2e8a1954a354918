//! Decomposition-based clustered batch.

use super::{Selected, Selection, SelectionContext, fill_random, finish, require_candidates};
use crate::decomposition::{Decomposition, reference_directions};
use crate::error::Result;
use crate::kmeans::kmeans;
use crate::solver::SearchOutcome;

const DUPLICATE_TOL: f64 = 1e-8;

/// Clusters candidates together with their best reference direction and
/// takes the best-scalarized member of each cluster.
///
/// Candidates already in the Pareto set, or repeated within the
/// population, are dropped first. If fewer unique candidates than
/// `batch_size` remain, all of them are taken and the rest of the batch is
/// drawn at random from the full population.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterSelection {
    decomposition: Decomposition,
}

impl ClusterSelection {
    /// Selection with the given scalarization. Default: Tchebycheff.
    #[must_use]
    pub fn new(decomposition: Decomposition) -> Self {
        Self { decomposition }
    }
}

fn same_point(a: &[f64], b: &[f64]) -> bool {
    a.iter().zip(b).all(|(u, v)| (u - v).abs() <= DUPLICATE_TOL)
}

impl Selection for ClusterSelection {
    fn select(
        &mut self,
        candidates: &SearchOutcome,
        ctx: &SelectionContext<'_>,
        batch_size: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<Selected> {
        require_candidates(candidates)?;
        let pareto = if ctx.pareto_x.is_empty() {
            Vec::new()
        } else {
            ctx.normalization.do_x(ctx.pareto_x)?
        };

        let mut unique: Vec<usize> = Vec::with_capacity(candidates.len());
        for (i, x) in candidates.x.iter().enumerate() {
            let known = pareto.iter().any(|p| same_point(p, x)) || unique.iter().any(|&u| same_point(&candidates.x[u], x));
            if !known {
                unique.push(i);
            }
        }

        if unique.len() <= batch_size {
            let mut indices = unique;
            fill_random(&mut indices, candidates.len(), batch_size, rng);
            return finish(candidates, ctx, indices, None);
        }

        let n_obj = candidates.f[0].len();
        let ideal: Vec<f64> = (0..n_obj)
            .map(|j| unique.iter().map(|&i| candidates.f[i][j]).fold(f64::INFINITY, f64::min))
            .collect();
        let directions = reference_directions(n_obj, unique.len());

        let mut scores = Vec::with_capacity(unique.len());
        let mut features = Vec::with_capacity(unique.len());
        for &i in &unique {
            let (score, w) = directions
                .iter()
                .map(|w| (self.decomposition.scalarize(&candidates.f[i], w, &ideal), w))
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .unwrap_or((f64::INFINITY, &ideal));
            scores.push(score);
            features.push(candidates.x[i].iter().chain(w).copied().collect::<Vec<f64>>());
        }

        let labels = kmeans(rng, &features, batch_size, 100);
        let mut best: Vec<Option<usize>> = vec![None; batch_size];
        for (k, &label) in labels.iter().enumerate() {
            match best[label] {
                Some(b) if scores[b] <= scores[k] => {}
                _ => best[label] = Some(k),
            }
        }
        let mut indices: Vec<usize> = best.into_iter().flatten().map(|k| unique[k]).collect();
        fill_random(&mut indices, candidates.len(), batch_size, rng);
        finish(candidates, ctx, indices, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::test_support::round;

    #[test]
    fn test_one_pick_per_cluster_without_pareto_duplicates() {
        let (gp, norm, pop) = round();
        let pareto_x = vec![pop.x[0].clone(), pop.x[5].clone()];
        let ctx = SelectionContext {
            surrogate: &gp,
            normalization: &norm,
            pareto_x: &pareto_x,
            pareto_y: &[],
            reference_point: None,
        };
        let out = ClusterSelection::default()
            .select(&pop, &ctx, 4, &mut fastrand::Rng::with_seed(2))
            .unwrap();
        assert_eq!(out.x.len(), 4);
        assert!(!out.info.indices.contains(&0));
        assert!(!out.info.indices.contains(&5));
        let mut idx = out.info.indices.clone();
        idx.sort_unstable();
        idx.dedup();
        assert_eq!(idx.len(), 4);
    }

    #[test]
    fn test_small_unique_pool_is_filled_from_population() {
        let (gp, norm, mut pop) = round();
        // Collapse the population onto two designs.
        for i in 0..pop.len() {
            pop.x[i] = pop.x[i % 2].clone();
            pop.f[i] = pop.f[i % 2].clone();
        }
        let ctx = SelectionContext {
            surrogate: &gp,
            normalization: &norm,
            pareto_x: &[],
            pareto_y: &[],
            reference_point: None,
        };
        let out = ClusterSelection::default()
            .select(&pop, &ctx, 5, &mut fastrand::Rng::with_seed(2))
            .unwrap();
        assert_eq!(out.x.len(), 5);
        assert!(out.info.indices.contains(&0));
        assert!(out.info.indices.contains(&1));
    }
}

//! NSGA-II over the unit box.
//!
//! Parents are chosen by binary tournament on (rank, crowding distance),
//! recombined by SBX crossover and perturbed by polynomial mutation.
//! Survivors of the merged parent and offspring population are taken front
//! by front, the last front truncated by crowding distance.

use super::{InnerSearch, SearchOutcome, SurrogateProblem};
use crate::error::Result;
use crate::kmeans::kmeans;
use crate::pareto::{crowding_distance, non_dominated_sort};
use crate::rng_util::f64_range;

/// NSGA-II inner search.
///
/// With [`n_families`](Nsga2SearchBuilder::n_families) set, the final
/// population is grouped into design-space families by k-means, enabling
/// family-aware batch selection.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Nsga2Search {
    crossover_prob: f64,
    crossover_eta: f64,
    mutation_eta: f64,
    n_families: Option<usize>,
}

impl Default for Nsga2Search {
    fn default() -> Self {
        Nsga2SearchBuilder::new().build()
    }
}

/// Builder for [`Nsga2Search`].
#[derive(Clone, Debug, Default)]
pub struct Nsga2SearchBuilder {
    crossover_prob: Option<f64>,
    crossover_eta: Option<f64>,
    mutation_eta: Option<f64>,
    n_families: Option<usize>,
}

impl Nsga2SearchBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the crossover probability. Default: 0.9.
    #[must_use]
    pub fn crossover_prob(mut self, prob: f64) -> Self {
        self.crossover_prob = Some(prob);
        self
    }

    /// Sets the SBX distribution index. Default: 15.0.
    #[must_use]
    pub fn crossover_eta(mut self, eta: f64) -> Self {
        self.crossover_eta = Some(eta);
        self
    }

    /// Sets the polynomial mutation distribution index. Default: 20.0.
    #[must_use]
    pub fn mutation_eta(mut self, eta: f64) -> Self {
        self.mutation_eta = Some(eta);
        self
    }

    /// Label the final population with this many k-means families.
    /// Default: no families.
    #[must_use]
    pub fn n_families(mut self, n: usize) -> Self {
        self.n_families = Some(n);
        self
    }

    /// Build the search engine.
    #[must_use]
    pub fn build(self) -> Nsga2Search {
        Nsga2Search {
            crossover_prob: self.crossover_prob.unwrap_or(0.9),
            crossover_eta: self.crossover_eta.unwrap_or(15.0),
            mutation_eta: self.mutation_eta.unwrap_or(20.0),
            n_families: self.n_families,
        }
    }
}

impl Nsga2Search {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> Nsga2SearchBuilder {
        Nsga2SearchBuilder::new()
    }

    /// Configured number of families, if any.
    #[must_use]
    pub fn n_families(&self) -> Option<usize> {
        self.n_families
    }

    fn offspring(&self, rng: &mut fastrand::Rng, parents: &[Vec<f64>], rank: &[usize], crowding: &[f64]) -> Vec<Vec<f64>> {
        let n = parents.len();
        let mut children = Vec::with_capacity(n);
        while children.len() < n {
            let p1 = tournament_select(rng, rank, crowding);
            let p2 = tournament_select(rng, rank, crowding);
            let (mut c1, mut c2) = crossover(rng, &parents[p1], &parents[p2], self.crossover_prob, self.crossover_eta);
            mutate(rng, &mut c1, self.mutation_eta);
            mutate(rng, &mut c2, self.mutation_eta);
            children.push(c1);
            if children.len() < n {
                children.push(c2);
            }
        }
        children
    }
}

/// Rank and crowding distance of every member.
fn rank_and_crowding(f: &[Vec<f64>]) -> (Vec<Vec<usize>>, Vec<usize>, Vec<f64>) {
    let fronts = non_dominated_sort(f);
    let mut rank = vec![0_usize; f.len()];
    let mut crowding = vec![0.0_f64; f.len()];
    for (r, front) in fronts.iter().enumerate() {
        let values: Vec<Vec<f64>> = front.iter().map(|&i| f[i].clone()).collect();
        for (&i, cd) in front.iter().zip(crowding_distance(&values)) {
            rank[i] = r;
            crowding[i] = cd;
        }
    }
    (fronts, rank, crowding)
}

/// Indices of the `n` survivors.
fn survivors(f: &[Vec<f64>], n: usize) -> Vec<usize> {
    let (fronts, _, crowding) = rank_and_crowding(f);
    let mut selected = Vec::with_capacity(n);
    for front in fronts {
        if selected.len() + front.len() <= n {
            selected.extend(front);
        } else {
            let mut sorted = front;
            sorted.sort_by(|&a, &b| crowding[b].total_cmp(&crowding[a]));
            selected.extend_from_slice(&sorted[..n - selected.len()]);
            break;
        }
    }
    selected
}

impl InnerSearch for Nsga2Search {
    fn search(
        &self,
        problem: &SurrogateProblem<'_>,
        initial: Vec<Vec<f64>>,
        n_gen: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<SearchOutcome> {
        let pop_size = initial.len();
        let mut x = initial;
        let mut f = problem.evaluate(&x)?;

        if pop_size >= 2 {
            for generation in 0..n_gen {
                let (_, rank, crowding) = rank_and_crowding(&f);
                let children = self.offspring(rng, &x, &rank, &crowding);
                let child_f = problem.evaluate(&children)?;
                x.extend(children);
                f.extend(child_f);

                let keep = survivors(&f, pop_size);
                x = keep.iter().map(|&i| x[i].clone()).collect();
                f = keep.iter().map(|&i| f[i].clone()).collect();
                trace_debug!(generation, "nsga2 generation complete");
            }
        }

        let families = self.n_families.map(|k| kmeans(rng, &x, k, 100));
        Ok(SearchOutcome { x, f, families })
    }
}

// ---------------------------------------------------------------------------
// Genetic operators
// ---------------------------------------------------------------------------

/// Binary tournament: lower rank wins, ties broken by larger crowding.
fn tournament_select(rng: &mut fastrand::Rng, rank: &[usize], crowding: &[f64]) -> usize {
    let n = rank.len();
    let a = rng.usize(0..n);
    let b = rng.usize(0..n);
    if rank[a] < rank[b] {
        a
    } else if rank[b] < rank[a] {
        b
    } else if crowding[a] >= crowding[b] {
        a
    } else {
        b
    }
}

/// SBX crossover on every variable, applied with probability `prob`.
fn crossover(rng: &mut fastrand::Rng, p1: &[f64], p2: &[f64], prob: f64, eta: f64) -> (Vec<f64>, Vec<f64>) {
    let mut c1 = p1.to_vec();
    let mut c2 = p2.to_vec();
    if rng.f64() > prob {
        return (c1, c2);
    }
    for i in 0..p1.len() {
        if (p1[i] - p2[i]).abs() < 1e-14 || rng.bool() {
            continue;
        }
        let (a, b) = sbx(rng, p1[i], p2[i], eta);
        c1[i] = a;
        c2[i] = b;
    }
    (c1, c2)
}

fn sbx(rng: &mut fastrand::Rng, p1: f64, p2: f64, eta: f64) -> (f64, f64) {
    let u = rng.f64();
    let beta = if u <= 0.5 {
        (2.0 * u).powf(1.0 / (eta + 1.0))
    } else {
        (1.0 / (2.0 * (1.0 - u))).powf(1.0 / (eta + 1.0))
    };
    let c1 = 0.5 * ((1.0 + beta) * p1 + (1.0 - beta) * p2);
    let c2 = 0.5 * ((1.0 - beta) * p1 + (1.0 + beta) * p2);
    (c1.clamp(0.0, 1.0), c2.clamp(0.0, 1.0))
}

/// Polynomial mutation with per-variable probability `1 / n_var`.
#[allow(clippy::cast_precision_loss)]
fn mutate(rng: &mut fastrand::Rng, x: &mut [f64], eta: f64) {
    if x.is_empty() {
        return;
    }
    let prob = 1.0 / x.len() as f64;
    for v in x.iter_mut() {
        if rng.f64() < prob {
            *v = polynomial_mutation(rng, *v, eta);
        }
    }
}

fn polynomial_mutation(rng: &mut fastrand::Rng, x: f64, eta: f64) -> f64 {
    let u = f64_range(rng, 0.0, 1.0);
    let delta_q = if u < 0.5 {
        let val = 2.0 * u + (1.0 - 2.0 * u) * (1.0 - x).powf(eta + 1.0);
        val.powf(1.0 / (eta + 1.0)) - 1.0
    } else {
        let val = 2.0 * (1.0 - u) + 2.0 * (u - 0.5) * x.powf(eta + 1.0);
        1.0 - val.powf(1.0 / (eta + 1.0))
    };
    (x + delta_q).clamp(0.0, 1.0)
}

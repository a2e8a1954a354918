//! Initial population strategies for the inner search.
//!
//! All strategies work in the continuous (encoded) design space and
//! return points inside the given box.
//!
//! | Strategy | Description |
//! |---|---|
//! | [`InitialSampling::LatinHypercube`] | One sample per stratum in every dimension |
//! | [`InitialSampling::NonDominated`] | Seed with the non-dominated history, pad with Latin hypercube |
//! | [`InitialSampling::Random`] | Independent uniform samples |
//! | `InitialSampling::Sobol` | Scrambled Sobol sequence (`sobol` feature) |

use core::str::FromStr;

use crate::error::{Error, Result, check_dim};
use crate::pareto::pareto_front_indices;
use crate::rng_util::{f64_range, sample_without_replacement};

/// How the inner search's first population is built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InitialSampling {
    /// Latin hypercube sampling.
    LatinHypercube,
    /// Non-dominated historical designs, padded by Latin hypercube (default).
    #[default]
    NonDominated,
    /// Uniform random sampling.
    Random,
    /// Scrambled Sobol sequence.
    #[cfg(feature = "sobol")]
    Sobol,
}

impl FromStr for InitialSampling {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lhs" | "latin_hypercube" => Ok(Self::LatinHypercube),
            "nds" | "non_dominated" => Ok(Self::NonDominated),
            "random" => Ok(Self::Random),
            #[cfg(feature = "sobol")]
            "sobol" => Ok(Self::Sobol),
            other => Err(Error::UnsupportedConfiguration(format!(
                "unknown initial sampling '{other}'"
            ))),
        }
    }
}

impl InitialSampling {
    /// Build `n` starting points inside `[lower, upper]`.
    ///
    /// `history` holds previously evaluated `(x, y)` in the same encoded
    /// space; only [`NonDominated`](Self::NonDominated) uses it.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if the bounds or history rows
    /// disagree in width.
    pub fn sample(
        self,
        rng: &mut fastrand::Rng,
        lower: &[f64],
        upper: &[f64],
        n: usize,
        history: Option<(&[Vec<f64>], &[Vec<f64>])>,
    ) -> Result<Vec<Vec<f64>>> {
        check_dim("sampling bounds", lower.len(), upper.len())?;
        match self {
            Self::LatinHypercube => Ok(latin_hypercube(rng, lower, upper, n)),
            Self::Random => Ok(uniform(rng, lower, upper, n)),
            Self::NonDominated => match history {
                Some((x, y)) => non_dominated_seeded(rng, lower, upper, n, x, y),
                None => Ok(latin_hypercube(rng, lower, upper, n)),
            },
            #[cfg(feature = "sobol")]
            Self::Sobol => Ok(sobol(rng, lower, upper, n)),
        }
    }
}

/// Latin hypercube sample of `n` points in the box.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn latin_hypercube(rng: &mut fastrand::Rng, lower: &[f64], upper: &[f64], n: usize) -> Vec<Vec<f64>> {
    let d = lower.len();
    let mut points = vec![vec![0.0; d]; n];
    if n == 0 {
        return points;
    }
    let width = 1.0 / n as f64;
    for j in 0..d {
        let mut strata: Vec<usize> = (0..n).collect();
        rng.shuffle(&mut strata);
        for (point, &s) in points.iter_mut().zip(&strata) {
            let u = (s as f64 + rng.f64()) * width;
            point[j] = lower[j] + u * (upper[j] - lower[j]);
        }
    }
    points
}

/// Independent uniform samples in the box.
#[must_use]
pub fn uniform(rng: &mut fastrand::Rng, lower: &[f64], upper: &[f64], n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|_| {
            lower
                .iter()
                .zip(upper)
                .map(|(&l, &u)| f64_range(rng, l, u))
                .collect()
        })
        .collect()
}

fn non_dominated_seeded(
    rng: &mut fastrand::Rng,
    lower: &[f64],
    upper: &[f64],
    n: usize,
    x: &[Vec<f64>],
    y: &[Vec<f64>],
) -> Result<Vec<Vec<f64>>> {
    check_dim("history rows", x.len(), y.len())?;
    for row in x {
        check_dim("history design width", lower.len(), row.len())?;
    }
    let front = pareto_front_indices(y);
    let mut seeds: Vec<Vec<f64>> = if front.len() > n {
        sample_without_replacement(rng, front.len(), n)
            .into_iter()
            .map(|i| x[front[i]].clone())
            .collect()
    } else {
        front.iter().map(|&i| x[i].clone()).collect()
    };
    let missing = n - seeds.len();
    seeds.extend(latin_hypercube(rng, lower, upper, missing));
    Ok(seeds)
}

#[cfg(feature = "sobol")]
#[allow(clippy::cast_possible_truncation)]
fn sobol(rng: &mut fastrand::Rng, lower: &[f64], upper: &[f64], n: usize) -> Vec<Vec<f64>> {
    let seed = rng.u32(..);
    (0..n)
        .map(|i| {
            lower
                .iter()
                .zip(upper)
                .enumerate()
                .map(|(j, (&l, &u))| {
                    let p = f64::from(sobol_burley::sample(i as u32, j as u32, seed));
                    l + p * (u - l)
                })
                .collect()
        })
        .collect()
}

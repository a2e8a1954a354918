//! Reference directions and scalarization of objective vectors.
//!
//! A weight vector on the unit simplex turns an objective vector into one
//! scalar. Cluster-based batch selection and the parallel scalarized
//! solver both work per direction.

use core::str::FromStr;

use crate::error::Error;

/// How an objective vector is collapsed onto one weight direction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Decomposition {
    /// `Σ wᵢ fᵢ`. Cannot reach concave parts of a front.
    WeightedSum,
    /// `maxᵢ wᵢ |fᵢ - zᵢ|`, weights floored at `1e-6`.
    #[default]
    Tchebycheff,
    /// Penalty-based boundary intersection: distance along the direction
    /// plus `theta` times the distance from it.
    Pbi {
        /// Penalty on the perpendicular distance.
        theta: f64,
    },
}

impl Decomposition {
    /// Scalarize `values` for `weight`, relative to the `ideal` point
    /// (ignored by the weighted sum).
    #[must_use]
    pub fn scalarize(&self, values: &[f64], weight: &[f64], ideal: &[f64]) -> f64 {
        match *self {
            Self::WeightedSum => values.iter().zip(weight).map(|(f, w)| f * w).sum(),
            Self::Tchebycheff => values
                .iter()
                .zip(weight)
                .zip(ideal)
                .map(|((f, w), z)| w.max(1e-6) * (f - z).abs())
                .fold(f64::NEG_INFINITY, f64::max),
            Self::Pbi { theta } => {
                let norm = weight.iter().map(|w| w * w).sum::<f64>().sqrt();
                if norm < 1e-30 {
                    return f64::INFINITY;
                }
                let shifted: Vec<f64> = values.iter().zip(ideal).map(|(f, z)| f - z).collect();
                let along: f64 = shifted.iter().zip(weight).map(|(s, w)| s * w / norm).sum();
                let across = shifted
                    .iter()
                    .zip(weight)
                    .map(|(s, w)| (s - along * w / norm).powi(2))
                    .sum::<f64>()
                    .sqrt();
                along + theta * across
            }
        }
    }
}

impl FromStr for Decomposition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "weighted_sum" | "ws" => Ok(Self::WeightedSum),
            "tchebycheff" | "tch" => Ok(Self::Tchebycheff),
            "pbi" => Ok(Self::Pbi { theta: 5.0 }),
            other => Err(Error::UnsupportedConfiguration(format!("unknown decomposition '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Reference directions
// ---------------------------------------------------------------------------

/// Every way to split `total` units over `parts` slots, first slot
/// ascending.
fn compositions(parts: usize, total: usize) -> Vec<Vec<usize>> {
    if parts == 1 {
        return vec![vec![total]];
    }
    (0..=total)
        .flat_map(|head| {
            compositions(parts - 1, total - head).into_iter().map(move |mut tail| {
                tail.insert(0, head);
                tail
            })
        })
        .collect()
}

/// Number of Das-Dennis points, `C(divisions + n_obj - 1, n_obj - 1)`.
fn lattice_size(n_obj: usize, divisions: usize) -> usize {
    let n = divisions + n_obj - 1;
    let k = (n_obj - 1).min(divisions);
    (1..=k).fold(1_usize, |acc, i| acc.saturating_mul(n - k + i) / i)
}

/// Das-Dennis simplex-lattice directions: every point of the unit simplex
/// in `n_obj` dimensions whose coordinates are multiples of `1 / divisions`.
///
/// `divisions == 0` yields the single centre direction.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn das_dennis(n_obj: usize, divisions: usize) -> Vec<Vec<f64>> {
    match (n_obj, divisions) {
        (0, _) => Vec::new(),
        (1, _) | (_, 0) => vec![vec![1.0 / n_obj as f64; n_obj]],
        _ => compositions(n_obj, divisions)
            .into_iter()
            .map(|c| c.into_iter().map(|u| u as f64 / divisions as f64).collect())
            .collect(),
    }
}

/// Smallest division count whose lattice has at least `target` points.
#[must_use]
pub fn auto_divisions(n_obj: usize, target: usize) -> usize {
    if n_obj <= 1 {
        return 1;
    }
    (1_usize..).find(|&h| lattice_size(n_obj, h) >= target).unwrap_or(1)
}

/// At least `target` evenly spread directions for `n_obj` objectives.
#[must_use]
pub fn reference_directions(n_obj: usize, target: usize) -> Vec<Vec<f64>> {
    das_dennis(n_obj, auto_divisions(n_obj, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_sum_ignores_ideal() {
        let v = Decomposition::WeightedSum.scalarize(&[2.0, 4.0], &[0.25, 0.75], &[10.0, 10.0]);
        assert!((v - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_tchebycheff_takes_worst_term() {
        let v = Decomposition::Tchebycheff.scalarize(&[1.0, 5.0], &[0.8, 0.2], &[0.0, 1.0]);
        assert!((v - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_pbi_penalizes_distance_from_direction() {
        let pbi = Decomposition::Pbi { theta: 5.0 };
        let on_line = pbi.scalarize(&[1.0, 1.0], &[1.0, 1.0], &[0.0, 0.0]);
        assert!((on_line - 2.0_f64.sqrt()).abs() < 1e-12);
        // (2, 0): along = sqrt(2), across = sqrt(2).
        let off_line = pbi.scalarize(&[2.0, 0.0], &[1.0, 1.0], &[0.0, 0.0]);
        assert!((off_line - 6.0 * 2.0_f64.sqrt()).abs() < 1e-12);
        assert!(pbi.scalarize(&[1.0, 1.0], &[0.0, 0.0], &[0.0, 0.0]).is_infinite());
    }

    #[test]
    fn test_lattice_points_on_simplex() {
        let two = das_dennis(2, 4);
        assert_eq!(two.len(), 5);
        assert_eq!(two[0], vec![0.0, 1.0]);
        assert_eq!(two[4], vec![1.0, 0.0]);
        let three = das_dennis(3, 4);
        assert_eq!(three.len(), 15);
        assert!(three.iter().all(|p| (p.iter().sum::<f64>() - 1.0).abs() < 1e-12));
        assert_eq!(das_dennis(3, 0), vec![vec![1.0 / 3.0; 3]]);
    }

    #[test]
    fn test_division_count_reaches_target() {
        assert_eq!(auto_divisions(2, 10), 9);
        assert_eq!(auto_divisions(3, 10), 3);
        assert_eq!(auto_divisions(3, 11), 4);
        assert_eq!(lattice_size(3, 4), 15);
        assert_eq!(reference_directions(4, 20).len(), 20);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("weighted-sum".parse::<Decomposition>().unwrap(), Decomposition::WeightedSum);
        assert_eq!("TCH".parse::<Decomposition>().unwrap(), Decomposition::Tchebycheff);
        assert!(matches!("boundary".parse::<Decomposition>(), Err(Error::UnsupportedConfiguration(_))));
    }
}

//! Dominance, ranking and hypervolume for minimized objective vectors.
//!
//! Callers with maximized objectives negate them first.
//!
//! ```
//! use mobo_core::pareto::{hypervolume, pareto_front_indices};
//!
//! let y = vec![vec![1.0, 5.0], vec![5.0, 1.0], vec![3.0, 3.0], vec![4.0, 4.0]];
//! let mut front = pareto_front_indices(&y);
//! front.sort_unstable();
//! assert_eq!(front, vec![0, 1, 2]);
//!
//! let values: Vec<_> = front.iter().map(|&i| y[i].clone()).collect();
//! assert!((hypervolume(&values, &[6.0, 6.0]) - 13.0).abs() < 1e-12);
//! ```

/// `a` is no worse than `b` everywhere and better somewhere.
#[must_use]
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).all(|(x, y)| x <= y) && a.iter().zip(b).any(|(x, y)| x < y)
}

/// Rank `values` into successive non-dominated fronts.
///
/// `fronts[0]` is the Pareto front; each later front is non-dominated once
/// the earlier ones are removed. Follows Deb's bookkeeping of domination
/// counts, O(M·N²).
#[must_use]
pub fn non_dominated_sort(values: &[Vec<f64>]) -> Vec<Vec<usize>> {
    let n = values.len();
    let mut beaten: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut count = vec![0_usize; n];
    for a in 0..n {
        for b in a + 1..n {
            let (winner, loser) = if dominates(&values[a], &values[b]) {
                (a, b)
            } else if dominates(&values[b], &values[a]) {
                (b, a)
            } else {
                continue;
            };
            beaten[winner].push(loser);
            count[loser] += 1;
        }
    }

    let mut fronts = Vec::new();
    let mut layer: Vec<usize> = (0..n).filter(|&i| count[i] == 0).collect();
    while !layer.is_empty() {
        let mut next = Vec::new();
        for &w in &layer {
            for &l in &beaten[w] {
                count[l] -= 1;
                if count[l] == 0 {
                    next.push(l);
                }
            }
        }
        fronts.push(core::mem::replace(&mut layer, next));
    }
    fronts
}

/// Indices of the non-dominated members of `values`.
#[must_use]
pub fn pareto_front_indices(values: &[Vec<f64>]) -> Vec<usize> {
    (0..values.len())
        .filter(|&i| !values.iter().any(|other| dominates(other, &values[i])))
        .collect()
}

/// Crowding distance of each member of `front`, in input order.
///
/// Extremes of every objective get [`f64::INFINITY`], as does every member
/// of a front with at most two points.
#[must_use]
pub fn crowding_distance(front: &[Vec<f64>]) -> Vec<f64> {
    let n = front.len();
    if n <= 2 {
        return vec![f64::INFINITY; n];
    }
    let mut distance = vec![0.0; n];
    for j in 0..front[0].len() {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| front[a][j].total_cmp(&front[b][j]));
        let (first, last) = (order[0], order[n - 1]);
        distance[first] = f64::INFINITY;
        distance[last] = f64::INFINITY;
        let span = front[last][j] - front[first][j];
        if span <= 0.0 {
            continue;
        }
        for w in order.windows(3) {
            distance[w[1]] += (front[w[2]][j] - front[w[0]][j]) / span;
        }
    }
    distance
}

// ---------------------------------------------------------------------------
// Hypervolume
// ---------------------------------------------------------------------------

/// Volume dominated by `front` inside the box bounded by `reference_point`.
///
/// Points that do not strictly beat the reference in every objective add
/// nothing. Exact: a sweep in two objectives, slicing along the last
/// objective above that.
#[must_use]
pub fn hypervolume(front: &[Vec<f64>], reference_point: &[f64]) -> f64 {
    let inside: Vec<Vec<f64>> = front
        .iter()
        .filter(|p| p.iter().zip(reference_point).all(|(v, r)| v < r))
        .cloned()
        .collect();
    if inside.is_empty() {
        return 0.0;
    }
    sliced_volume(inside, reference_point)
}

/// Hypervolume added by inserting `point` into `front`. Never negative.
#[must_use]
pub fn hypervolume_contribution(front: &[Vec<f64>], point: &[f64], reference_point: &[f64]) -> f64 {
    let mut extended = front.to_vec();
    extended.push(point.to_vec());
    (hypervolume(&extended, reference_point) - hypervolume(front, reference_point)).max(0.0)
}

fn sliced_volume(mut points: Vec<Vec<f64>>, reference: &[f64]) -> f64 {
    let d = reference.len();
    match d {
        0 => return 0.0,
        1 => {
            let best = points.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
            return (reference[0] - best).max(0.0);
        }
        2 => return sweep_2d(points, reference),
        _ => {}
    }

    let last = d - 1;
    points.sort_by(|a, b| a[last].total_cmp(&b[last]));
    let mut volume = 0.0;
    let mut slab: Vec<Vec<f64>> = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        slab.push(p[..last].to_vec());
        let top = points.get(i + 1).map_or(reference[last], |q| q[last]);
        let depth = top - p[last];
        if depth > 0.0 {
            volume += depth * sliced_volume(slab.clone(), &reference[..last]);
        }
    }
    volume
}

/// Area dominated by a set of 2-D points, by a staircase sweep in `f0`.
fn sweep_2d(mut points: Vec<Vec<f64>>, reference: &[f64]) -> f64 {
    points.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    let mut area = 0.0;
    let mut ceiling = reference[1];
    for p in &points {
        if p[1] < ceiling {
            area += (reference[0] - p[0]) * (ceiling - p[1]);
            ceiling = p[1];
        }
    }
    area
}

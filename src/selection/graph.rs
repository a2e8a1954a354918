//! Graph labelling for the sparse Pareto-front approximation.
//!
//! Cells of the [`ParetoBuffer`](super::ParetoBuffer) become nodes of a
//! graph; a [`LabelOptimizer`] assigns one family label per node,
//! trading off per-node fit (unary costs), disagreement between adjacent
//! nodes (pairwise costs), and the number of distinct labels used.
//!
//! Adjacency comes from a chain for angular cells and from a Delaunay
//! triangulation (Bowyer-Watson) for spherical cells.

use std::collections::BTreeSet;

/// Discrete energy minimizer over node labels.
///
/// Minimizes `Σ unary[i][l_i] + Σ_(i,j)∈edges pairwise[l_i][l_j] +
/// label_cost · |{l_i}|`.
pub trait LabelOptimizer: Send + Sync {
    /// One label in `0..n_labels` per node, where `n_labels` is the width of
    /// each `unary` row.
    fn optimize(&self, unary: &[Vec<i64>], pairwise: &[Vec<i64>], edges: &[(usize, usize)], label_cost: i64) -> Vec<usize>;
}

/// Coordinate descent over node labels (ICM), started from the best unary
/// label of every node.
///
/// Deterministic: nodes are visited in index order and ties keep the
/// current label.
#[derive(Clone, Copy, Debug)]
pub struct IteratedConditionalModes {
    max_sweeps: usize,
}

impl Default for IteratedConditionalModes {
    fn default() -> Self {
        Self { max_sweeps: 100 }
    }
}

impl IteratedConditionalModes {
    /// ICM with at most `max_sweeps` passes over the nodes.
    #[must_use]
    pub fn new(max_sweeps: usize) -> Self {
        Self { max_sweeps }
    }
}

/// Total energy of a labelling.
#[must_use]
pub fn energy(unary: &[Vec<i64>], pairwise: &[Vec<i64>], edges: &[(usize, usize)], label_cost: i64, labels: &[usize]) -> i64 {
    let data: i64 = labels.iter().enumerate().map(|(i, &l)| unary[i][l]).sum();
    let smooth: i64 = edges.iter().map(|&(a, b)| pairwise[labels[a]][labels[b]]).sum();
    let distinct = labels.iter().collect::<BTreeSet<_>>().len();
    #[allow(clippy::cast_possible_wrap)]
    let used = distinct as i64;
    data + smooth + label_cost * used
}

impl LabelOptimizer for IteratedConditionalModes {
    fn optimize(&self, unary: &[Vec<i64>], pairwise: &[Vec<i64>], edges: &[(usize, usize)], label_cost: i64) -> Vec<usize> {
        let n = unary.len();
        let n_labels = unary.first().map_or(0, Vec::len);
        if n == 0 || n_labels == 0 {
            return vec![0; n];
        }

        let mut neighbours = vec![Vec::new(); n];
        for &(a, b) in edges {
            neighbours[a].push(b);
            neighbours[b].push(a);
        }

        let mut labels: Vec<usize> = unary
            .iter()
            .map(|row| (0..n_labels).min_by_key(|&l| row[l]).unwrap_or(0))
            .collect();
        let mut usage = vec![0_usize; n_labels];
        for &l in &labels {
            usage[l] += 1;
        }

        for _ in 0..self.max_sweeps {
            let mut changed = false;
            for i in 0..n {
                let current = labels[i];
                let local = |l: usize| -> i64 {
                    let smooth: i64 = neighbours[i].iter().map(|&j| pairwise[l][labels[j]]).sum();
                    let others = usage[l] - usize::from(l == current);
                    let opening = if others == 0 { label_cost } else { 0 };
                    unary[i][l] + smooth + opening
                };
                let mut best = (local(current), current);
                for l in 0..n_labels {
                    let cost = local(l);
                    if cost < best.0 {
                        best = (cost, l);
                    }
                }
                if best.1 != current {
                    usage[current] -= 1;
                    usage[best.1] += 1;
                    labels[i] = best.1;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        labels
    }
}

// ---------------------------------------------------------------------------
// Adjacency
// ---------------------------------------------------------------------------

/// Edges `(i, i + 1)` of a path through `n` nodes.
#[must_use]
pub fn chain_edges(n: usize) -> Vec<(usize, usize)> {
    (1..n).map(|i| (i - 1, i)).collect()
}

/// Undirected edges of a planar mesh over `points`.
///
/// Up to three points are connected explicitly (a pair, or a triangle).
/// Larger sets use the Delaunay triangulation; a degenerate (collinear)
/// set falls back to a chain in lexicographic order.
#[must_use]
pub fn mesh_edges(points: &[[f64; 2]]) -> Vec<(usize, usize)> {
    match points.len() {
        0 | 1 => Vec::new(),
        2 => vec![(0, 1)],
        3 => vec![(0, 1), (0, 2), (1, 2)],
        n => {
            let triangles = delaunay_triangles(points);
            if triangles.is_empty() {
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| {
                    points[a][0]
                        .total_cmp(&points[b][0])
                        .then(points[a][1].total_cmp(&points[b][1]))
                });
                return order.windows(2).map(|w| (w[0].min(w[1]), w[0].max(w[1]))).collect();
            }
            let mut edges = BTreeSet::new();
            for t in triangles {
                for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[0], t[2])] {
                    edges.insert((a.min(b), a.max(b)));
                }
            }
            edges.into_iter().collect()
        }
    }
}

/// Circumcentre and squared radius, `None` for a degenerate triangle.
fn circumcircle(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Option<([f64; 2], f64)> {
    let d = 2.0 * (a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1]));
    if d.abs() < 1e-18 {
        return None;
    }
    let a2 = a[0] * a[0] + a[1] * a[1];
    let b2 = b[0] * b[0] + b[1] * b[1];
    let c2 = c[0] * c[0] + c[1] * c[1];
    let ux = (a2 * (b[1] - c[1]) + b2 * (c[1] - a[1]) + c2 * (a[1] - b[1])) / d;
    let uy = (a2 * (c[0] - b[0]) + b2 * (a[0] - c[0]) + c2 * (b[0] - a[0])) / d;
    let r2 = (a[0] - ux).powi(2) + (a[1] - uy).powi(2);
    Some(([ux, uy], r2))
}

/// Delaunay triangulation by Bowyer-Watson insertion.
///
/// Returns triangles as index triples into `points`.
#[must_use]
pub fn delaunay_triangles(points: &[[f64; 2]]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p[0]);
        min_y = min_y.min(p[1]);
        max_x = max_x.max(p[0]);
        max_y = max_y.max(p[1]);
    }
    let span = (max_x - min_x).max(max_y - min_y).max(1e-12);
    let (mid_x, mid_y) = (0.5 * (min_x + max_x), 0.5 * (min_y + max_y));

    // Super-triangle enclosing every point.
    let mut vertices: Vec<[f64; 2]> = points.to_vec();
    vertices.push([mid_x - 20.0 * span, mid_y - span]);
    vertices.push([mid_x, mid_y + 20.0 * span]);
    vertices.push([mid_x + 20.0 * span, mid_y - span]);
    let mut triangles: Vec<[usize; 3]> = vec![[n, n + 1, n + 2]];

    for (i, p) in points.iter().enumerate() {
        let mut bad = Vec::new();
        triangles.retain(|t| {
            let inside = circumcircle(vertices[t[0]], vertices[t[1]], vertices[t[2]])
                .is_some_and(|(c, r2)| (p[0] - c[0]).powi(2) + (p[1] - c[1]).powi(2) < r2 * (1.0 - 1e-12));
            if inside {
                bad.push(*t);
            }
            !inside
        });

        // Boundary of the cavity: edges belonging to exactly one bad triangle.
        let mut boundary: Vec<(usize, usize)> = Vec::new();
        for t in &bad {
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                let key = (a.min(b), a.max(b));
                if let Some(pos) = boundary.iter().position(|&e| e == key) {
                    boundary.swap_remove(pos);
                } else {
                    boundary.push(key);
                }
            }
        }
        for (a, b) in boundary {
            triangles.push([a, b, i]);
        }
    }

    triangles
        .into_iter()
        .filter(|t| t.iter().all(|&v| v < n))
        .filter(|t| circumcircle(points[t[0]], points[t[1]], points[t[2]]).is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_with_centre() {
        let points = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.5, 0.5]];
        let triangles = delaunay_triangles(&points);
        assert_eq!(triangles.len(), 4);
        let edges = mesh_edges(&points);
        // Four sides plus four spokes to the centre.
        assert_eq!(edges.len(), 8);
        for corner in 0..4 {
            assert!(edges.contains(&(corner, 4)));
        }
    }

    #[test]
    fn test_collinear_points_fall_back_to_chain() {
        let points = [[0.0, 0.0], [2.0, 0.0], [1.0, 0.0], [3.0, 0.0]];
        let edges = mesh_edges(&points);
        assert_eq!(edges, vec![(0, 2), (1, 2), (1, 3)]);
    }

    #[test]
    fn test_small_meshes() {
        assert!(mesh_edges(&[[0.0, 0.0]]).is_empty());
        assert_eq!(mesh_edges(&[[0.0, 0.0], [1.0, 0.0]]), vec![(0, 1)]);
        assert_eq!(mesh_edges(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]).len(), 3);
        assert_eq!(chain_edges(3), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_icm_smooths_outlier() {
        // Node 1 slightly prefers label 1, its neighbours strongly prefer 0.
        let unary = vec![vec![0, 100], vec![60, 50], vec![0, 100]];
        let pairwise = vec![vec![0, 40], vec![40, 0]];
        let edges = chain_edges(3);
        let icm = IteratedConditionalModes::default();
        let labels = icm.optimize(&unary, &pairwise, &edges, 0);
        assert_eq!(labels, vec![0, 0, 0]);
        assert!(energy(&unary, &pairwise, &edges, 0, &labels) < energy(&unary, &pairwise, &edges, 0, &[0, 1, 0]));
    }

    #[test]
    fn test_icm_label_cost_merges_labels() {
        let unary = vec![vec![0, 10], vec![10, 0]];
        let pairwise = vec![vec![0, 0], vec![0, 0]];
        let icm = IteratedConditionalModes::default();
        assert_eq!(icm.optimize(&unary, &pairwise, &[], 0), vec![0, 1]);
        let merged = icm.optimize(&unary, &pairwise, &[], 50);
        assert_eq!(merged[0], merged[1]);
    }
}

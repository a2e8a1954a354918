//! Lloyd's k-means with k-means++ seeding.
//!
//! Used to group inner-search designs into families and to cluster
//! candidates for batch selection.

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Cluster labels in `0..k` for every point, with `k` clamped to the
/// number of points. Every label in `0..k` is used at least once.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn kmeans(rng: &mut fastrand::Rng, points: &[Vec<f64>], k: usize, max_iter: usize) -> Vec<usize> {
    let n = points.len();
    let k = k.min(n);
    if k <= 1 {
        return vec![0; n];
    }

    // k-means++ seeding
    let mut centres: Vec<Vec<f64>> = vec![points[rng.usize(0..n)].clone()];
    let mut nearest: Vec<f64> = points.iter().map(|p| squared_distance(p, &centres[0])).collect();
    while centres.len() < k {
        let total: f64 = nearest.iter().sum();
        let idx = if total > 0.0 {
            let mut target = rng.f64() * total;
            let mut chosen = n - 1;
            for (i, d) in nearest.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.usize(0..n)
        };
        centres.push(points[idx].clone());
        for (d, p) in nearest.iter_mut().zip(points) {
            *d = d.min(squared_distance(p, &points[idx]));
        }
    }

    let mut labels = vec![0_usize; n];
    for iter in 0..max_iter.max(1) {
        let mut changed = false;
        for (label, p) in labels.iter_mut().zip(points) {
            let best = centres
                .iter()
                .enumerate()
                .map(|(c, centre)| (squared_distance(p, centre), c))
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .map_or(0, |(_, c)| c);
            if *label != best {
                *label = best;
                changed = true;
            }
        }
        if !changed && iter > 0 {
            break;
        }

        let dim = points[0].len();
        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0_usize; k];
        for (&label, p) in labels.iter().zip(points) {
            counts[label] += 1;
            for (s, v) in sums[label].iter_mut().zip(p) {
                *s += v;
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                // Re-seed an empty cluster at the point farthest from its centre.
                let far = (0..n)
                    .max_by(|&a, &b| {
                        squared_distance(&points[a], &centres[labels[a]])
                            .total_cmp(&squared_distance(&points[b], &centres[labels[b]]))
                    })
                    .unwrap_or(0);
                centres[c] = points[far].clone();
                labels[far] = c;
            } else {
                centres[c] = sums[c].iter().map(|s| s / counts[c] as f64).collect();
            }
        }
    }

    // A re-seed may have emptied another cluster on the last pass.
    let mut used = vec![false; k];
    for &l in &labels {
        used[l] = true;
    }
    let mut free = (0..n).rev();
    for c in (0..k).filter(|&c| !used[c]) {
        if let Some(i) = free.find(|&i| labels.iter().filter(|&&l| l == labels[i]).count() > 1) {
            labels[i] = c;
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separates_blobs() {
        let mut rng = fastrand::Rng::with_seed(2);
        let mut points = Vec::new();
        for i in 0..10 {
            let t = f64::from(i) * 0.01;
            points.push(vec![t, t]);
            points.push(vec![5.0 + t, 5.0 - t]);
        }
        let labels = kmeans(&mut rng, &points, 2, 50);
        for pair in labels.chunks(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert!(labels.iter().step_by(2).all(|&l| l == labels[0]));
    }

    #[test]
    fn test_all_labels_used() {
        let mut rng = fastrand::Rng::with_seed(5);
        let points: Vec<Vec<f64>> = (0..7).map(|_| vec![1.0, 1.0]).collect();
        let labels = kmeans(&mut rng, &points, 3, 10);
        for c in 0..3 {
            assert!(labels.contains(&c), "label {c} unused in {labels:?}");
        }
        assert_eq!(kmeans(&mut rng, &points[..2], 5, 10).len(), 2);
    }
}

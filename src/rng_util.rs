/// Generate a random `f64` in the range `[low, high)`.
#[inline]
pub(crate) fn f64_range(rng: &mut fastrand::Rng, low: f64, high: f64) -> f64 {
    low + rng.f64() * (high - low)
}

/// Sample from the standard normal distribution using the Box-Muller transform.
pub(crate) fn standard_normal(rng: &mut fastrand::Rng) -> f64 {
    // 1 - u keeps the log argument in (0, 1].
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * core::f64::consts::PI * u2).cos()
}

/// Sample from `Gamma(shape, 1)` (Marsaglia-Tsang).
pub(crate) fn gamma(rng: &mut fastrand::Rng, shape: f64) -> f64 {
    if shape < 1.0 {
        // Boost: Gamma(a) = Gamma(a + 1) * U^(1/a)
        let u = 1.0 - rng.f64();
        return gamma(rng, shape + 1.0) * u.powf(1.0 / shape);
    }
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let z = standard_normal(rng);
        let v = 1.0 + c * z;
        if v <= 0.0 {
            continue;
        }
        let v = v * v * v;
        let u = 1.0 - rng.f64();
        if u.ln() < 0.5 * z * z + d - d * v + d * v.ln() {
            return d * v;
        }
    }
}

/// Sample from a chi-square distribution with `dof` degrees of freedom.
pub(crate) fn chi_square(rng: &mut fastrand::Rng, dof: f64) -> f64 {
    2.0 * gamma(rng, 0.5 * dof)
}

/// Draw `k` distinct indices from `0..n` (partial Fisher-Yates).
pub(crate) fn sample_without_replacement(rng: &mut fastrand::Rng, n: usize, k: usize) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..n).collect();
    let k = k.min(n);
    for i in 0..k {
        let j = rng.usize(i..n);
        pool.swap(i, j);
    }
    pool.truncate(k);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_standard_normal_moments() {
        let mut rng = fastrand::Rng::with_seed(7);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| standard_normal(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_chi_square_mean() {
        let mut rng = fastrand::Rng::with_seed(11);
        let n = 20_000;
        let mean = (0..n).map(|_| chi_square(&mut rng, 5.0)).sum::<f64>() / n as f64;
        assert!((mean - 5.0).abs() < 0.2, "mean {mean}");
    }

    #[test]
    fn test_sample_without_replacement_distinct() {
        let mut rng = fastrand::Rng::with_seed(3);
        let mut idx = sample_without_replacement(&mut rng, 10, 6);
        assert_eq!(idx.len(), 6);
        idx.sort_unstable();
        idx.dedup();
        assert_eq!(idx.len(), 6);
        assert!(idx.iter().all(|&i| i < 10));
        assert_eq!(sample_without_replacement(&mut rng, 3, 5).len(), 3);
    }
}

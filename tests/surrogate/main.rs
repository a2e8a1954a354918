#![allow(clippy::cast_precision_loss)]

mod gradients;
mod models;

use mobo_core::normalization::{Normalization, TrainingSet};

/// Two objectives over three normalized inputs.
pub(crate) fn training_set(n: usize, seed: u64) -> TrainingSet {
    let mut rng = fastrand::Rng::with_seed(seed);
    let x: Vec<Vec<f64>> = (0..n).map(|_| (0..3).map(|_| rng.f64()).collect()).collect();
    let y: Vec<Vec<f64>> = x
        .iter()
        .map(|p| {
            vec![
                (3.0 * p[0]).sin() + p[1] * p[2],
                (p[0] - 0.5).powi(2) + (2.0 * p[1]).cos() - p[2],
            ]
        })
        .collect();
    let mut norm = Normalization::with_bounds(vec![0.0; 3], vec![1.0; 3]).unwrap();
    norm.fit(&x, &y).unwrap();
    norm.training_set(&x, &y).unwrap()
}

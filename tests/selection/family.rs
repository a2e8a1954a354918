use std::collections::BTreeSet;

use mobo_core::selection::{HypervolumeSelection, Selection, SelectionContext};
use mobo_core::solver::SearchOutcome;

use crate::{TableSurrogate, table_designs, unit_normalization};

/// Ten candidates along a convex front, in five families of two.
fn population() -> (TableSurrogate, SearchOutcome) {
    let mean: Vec<Vec<f64>> = (0..10)
        .map(|i| {
            let t = f64::from(i) / 9.0;
            vec![t, (1.0 - t).powi(2)]
        })
        .collect();
    let surrogate = TableSurrogate {
        std: vec![vec![0.1, 0.1]; 10],
        mean: mean.clone(),
    };
    let candidates = SearchOutcome {
        x: table_designs(10),
        f: mean,
        families: Some((0..10).map(|i| i / 2).collect()),
    };
    (surrogate, candidates)
}

#[test]
fn test_no_family_repeats_within_a_cycle() {
    let (surrogate, candidates) = population();
    let norm = unit_normalization();
    let reference = [1.5, 1.5];
    let ctx = SelectionContext {
        surrogate: &surrogate,
        normalization: &norm,
        pareto_x: &[],
        pareto_y: &[],
        reference_point: Some(&reference),
    };
    let mut rng = fastrand::Rng::with_seed(3);
    for batch_size in 1..=10 {
        let out = HypervolumeSelection::new()
            .select(&candidates, &ctx, batch_size, &mut rng)
            .unwrap();
        assert_eq!(out.x.len(), batch_size);
        let families = out.info.families.unwrap();
        for cycle in families.chunks(5) {
            let distinct: BTreeSet<usize> = cycle.iter().copied().collect();
            assert_eq!(distinct.len(), cycle.len());
        }
    }
}

#[test]
fn test_first_pick_maximizes_hypervolume() {
    let (surrogate, candidates) = population();
    let norm = unit_normalization();
    let reference = [1.0, 1.0];
    let ctx = SelectionContext {
        surrogate: &surrogate,
        normalization: &norm,
        pareto_x: &[],
        pareto_y: &[],
        reference_point: Some(&reference),
    };
    let out = HypervolumeSelection::new()
        .select(&candidates, &ctx, 1, &mut fastrand::Rng::with_seed(0))
        .unwrap();
    // (1 - t)(1 - (1 - t)^2) peaks near t = 0.42, i.e. candidate 4.
    assert_eq!(out.info.indices, vec![4]);
}

#[test]
fn test_oversized_batch_is_padded() {
    let (surrogate, candidates) = population();
    let norm = unit_normalization();
    let ctx = SelectionContext {
        surrogate: &surrogate,
        normalization: &norm,
        pareto_x: &[],
        pareto_y: &[],
        reference_point: None,
    };
    let out = HypervolumeSelection::new()
        .select(&candidates, &ctx, 13, &mut fastrand::Rng::with_seed(0))
        .unwrap();
    assert_eq!(out.x.len(), 13);
    let first = out.info.indices[0];
    assert_eq!(&out.info.indices[10..], &[first; 3]);
}

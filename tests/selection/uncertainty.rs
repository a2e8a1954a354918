use mobo_core::selection::{Selection, SelectionContext, UncertaintySelection};
use mobo_core::solver::SearchOutcome;

use crate::{TableSurrogate, table_designs, unit_normalization};

#[test]
fn test_largest_std_product_selected() {
    let surrogate = TableSurrogate {
        mean: vec![vec![0.0, 0.0]; 5],
        std: vec![vec![1.0, 1.0], vec![3.0, 1.0], vec![0.0, 0.0], vec![2.0, 5.0], vec![1.0, 1.0]],
    };
    let norm = unit_normalization();
    let candidates = SearchOutcome {
        x: table_designs(5),
        f: vec![vec![0.0, 0.0]; 5],
        families: None,
    };
    let ctx = SelectionContext {
        surrogate: &surrogate,
        normalization: &norm,
        pareto_x: &[],
        pareto_y: &[],
        reference_point: None,
    };
    let out = UncertaintySelection
        .select(&candidates, &ctx, 2, &mut fastrand::Rng::with_seed(0))
        .unwrap();
    assert_eq!(out.info.indices, vec![3, 1]);
    assert!((out.x[0][0] - 0.3).abs() < 1e-12);
    assert!((out.x[1][0] - 0.1).abs() < 1e-12);
}

#[test]
fn test_empty_population_rejected() {
    let surrogate = TableSurrogate { mean: vec![], std: vec![] };
    let norm = unit_normalization();
    let ctx = SelectionContext {
        surrogate: &surrogate,
        normalization: &norm,
        pareto_x: &[],
        pareto_y: &[],
        reference_point: None,
    };
    let result = UncertaintySelection.select(&SearchOutcome::default(), &ctx, 2, &mut fastrand::Rng::with_seed(0));
    assert!(matches!(result, Err(mobo_core::Error::EmptyDataset)));
}

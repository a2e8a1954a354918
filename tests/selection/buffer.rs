use mobo_core::selection::ParetoBuffer;
use mobo_core::selection::graph::IteratedConditionalModes;

#[test]
fn test_points_land_in_their_angular_cells() {
    let mut buffer = ParetoBuffer::builder(2).cell_num(4).cell_capacity(1).build().unwrap();
    let y = [vec![0.0, 5.0], vec![5.0, 0.0], vec![2.0, 2.0]];
    for (i, row) in y.iter().enumerate() {
        buffer.insert(&[vec![f64::from(u8::try_from(i).unwrap())]], &[row.clone()], &[0]).unwrap();
    }

    assert_eq!(buffer.cell_of(&y[0]), Some(3));
    assert_eq!(buffer.cell_of(&y[1]), Some(0));
    assert_eq!(buffer.cell_of(&y[2]), Some(2));
    assert_eq!(buffer.cell(3)[0].y, y[0]);
    assert_eq!(buffer.cell(0)[0].y, y[1]);
    assert_eq!(buffer.cell(2)[0].y, y[2]);
    assert!(buffer.len() <= 4);
    assert_eq!(buffer.len(), 3);
}

#[test]
fn test_capacity_keeps_closest_points() {
    let mut buffer = ParetoBuffer::builder(2).cell_num(1).cell_capacity(2).build().unwrap();
    let y = vec![vec![3.0, 3.0], vec![1.0, 1.0], vec![2.0, 2.0], vec![4.0, 4.0]];
    let x: Vec<Vec<f64>> = (0..4).map(|i| vec![f64::from(i)]).collect();
    buffer.insert(&x, &y, &[0, 1, 2, 3]).unwrap();
    let kept: Vec<usize> = buffer.cell(0).iter().map(|e| e.family).collect();
    assert_eq!(kept, vec![1, 2]);
    assert!(buffer.cell(0).windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn test_sparse_approximation_covers_occupied_cells() {
    let mut buffer = ParetoBuffer::builder(2).cell_num(6).cell_capacity(3).build().unwrap();
    let mut rng = fastrand::Rng::with_seed(17);
    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut families = Vec::new();
    for i in 0..30 {
        let t = rng.f64();
        x.push(vec![t]);
        y.push(vec![t, 1.0 - t.sqrt() + 0.05 * rng.f64()]);
        families.push(i % 3);
    }
    buffer.insert(&x, &y, &families).unwrap();

    let approx = buffer.sparse_approximation(&IteratedConditionalModes::default()).unwrap();
    let occupied = (0..buffer.cell_num()).filter(|&c| !buffer.cell(c).is_empty()).count();
    assert_eq!(approx.cells.len(), occupied);
    for ((&c, f), y) in approx.cells.iter().zip(&approx.families).zip(&approx.y) {
        assert!(buffer.cell(c).iter().any(|e| e.family == *f && &e.y == y));
    }
}

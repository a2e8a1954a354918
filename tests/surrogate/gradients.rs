use mobo_core::surrogate::{EvalRequest, GaussianProcess, Kernel, SurrogateModel};

use crate::training_set;

const H: f64 = 1e-6;

fn assert_close(analytic: f64, numeric: f64, what: &str) {
    let tol = 1e-4 * (1.0 + numeric.abs());
    assert!(
        (analytic - numeric).abs() < tol,
        "{what}: analytic {analytic} vs numeric {numeric}"
    );
}

fn check_kernel(kernel: Kernel) {
    let data = training_set(15, 3);
    let mut gp = GaussianProcess::builder().kernel(kernel).build();
    gp.fit(&data, &mut fastrand::Rng::with_seed(8)).unwrap();

    let mut rng = fastrand::Rng::with_seed(99);
    for _ in 0..5 {
        let x: Vec<f64> = (0..3).map(|_| 0.1 + 0.8 * rng.f64()).collect();
        let full = gp
            .evaluate(&[x.clone()], EvalRequest::mean().with_std().with_gradient())
            .unwrap();
        let dmean = &full.mean_grad.as_ref().unwrap()[0];
        let dstd = &full.std_grad.as_ref().unwrap()[0];

        for k in 0..3 {
            let mut up = x.clone();
            let mut down = x.clone();
            up[k] += H;
            down[k] -= H;
            let pu = gp.evaluate(&[up], EvalRequest::mean().with_std()).unwrap();
            let pd = gp.evaluate(&[down], EvalRequest::mean().with_std()).unwrap();
            let (su, sd) = (pu.std.unwrap(), pd.std.unwrap());
            for j in 0..2 {
                let num_mean = (pu.mean[0][j] - pd.mean[0][j]) / (2.0 * H);
                let num_std = (su[0][j] - sd[0][j]) / (2.0 * H);
                assert_close(dmean[(j, k)], num_mean, &format!("{kernel:?} mean d{k} obj {j}"));
                assert_close(dstd[(j, k)], num_std, &format!("{kernel:?} std d{k} obj {j}"));
            }
        }
    }
}

#[test]
fn test_matern12_gradient() {
    check_kernel(Kernel::Matern12);
}

#[test]
fn test_matern32_gradient() {
    check_kernel(Kernel::Matern32);
}

#[test]
fn test_matern52_gradient() {
    check_kernel(Kernel::Matern52);
}

#[test]
fn test_squared_exponential_gradient() {
    check_kernel(Kernel::SquaredExponential);
}

#[test]
fn test_mean_hessian_matches_gradient_differences() {
    let data = training_set(12, 4);
    let mut gp = GaussianProcess::builder().kernel(Kernel::SquaredExponential).build();
    gp.fit(&data, &mut fastrand::Rng::with_seed(2)).unwrap();
    let x = vec![0.4, 0.55, 0.3];
    let full = gp.evaluate(&[x.clone()], EvalRequest::all()).unwrap();
    let hess = &full.mean_hess.unwrap()[0];
    for k in 0..3 {
        let mut up = x.clone();
        let mut down = x.clone();
        up[k] += H;
        down[k] -= H;
        let gu = &gp.evaluate(&[up], EvalRequest::mean().with_gradient()).unwrap().mean_grad.unwrap()[0];
        let gd = &gp.evaluate(&[down], EvalRequest::mean().with_gradient()).unwrap().mean_grad.unwrap()[0];
        for j in 0..2 {
            for l in 0..3 {
                let numeric = (gu[(j, l)] - gd[(j, l)]) / (2.0 * H);
                assert_close(hess[j][(l, k)], numeric, &format!("hessian obj {j} ({l},{k})"));
            }
        }
    }
}

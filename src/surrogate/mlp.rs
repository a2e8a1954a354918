//! Scalar-output multilayer perceptron shared by the network surrogates.
//!
//! Hidden layers use `tanh`; the output layer is linear. Input gradients
//! and Hessians are propagated forward alongside the activations:
//!
//! - `Jz = W Ja`, `Hz_k = Σ_m W_km Ha_m`
//! - `Ja'_k = σ'(z_k) Jz_k`, `Ha'_k = σ''(z_k) Jz_kᵀ Jz_k + σ'(z_k) Hz_k`

use nalgebra::{DMatrix, DVector};

use crate::rng_util::f64_range;

/// Training settings.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct TrainConfig {
    pub(crate) hidden: Vec<usize>,
    pub(crate) epochs: usize,
    pub(crate) learning_rate: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            hidden: vec![32, 32],
            epochs: 600,
            learning_rate: 1e-2,
        }
    }
}

#[derive(Clone, Debug)]
struct Layer {
    w: DMatrix<f64>,
    b: DVector<f64>,
}

/// Adam moments for one layer.
#[derive(Clone, Debug)]
struct Moments {
    mw: DMatrix<f64>,
    vw: DMatrix<f64>,
    mb: DVector<f64>,
    vb: DVector<f64>,
}

/// Output value with its input gradient and (optionally) Hessian.
pub(crate) struct Derivatives {
    pub(crate) value: f64,
    pub(crate) gradient: DVector<f64>,
    pub(crate) hessian: Option<DMatrix<f64>>,
}

#[derive(Clone, Debug)]
pub(crate) struct Mlp {
    layers: Vec<Layer>,
}

impl Mlp {
    /// Glorot-uniform initialised network with `n_in` inputs and one output.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn new(rng: &mut fastrand::Rng, n_in: usize, hidden: &[usize]) -> Self {
        let mut sizes = Vec::with_capacity(hidden.len() + 2);
        sizes.push(n_in);
        sizes.extend_from_slice(hidden);
        sizes.push(1);
        let layers = sizes
            .windows(2)
            .map(|pair| {
                let (fan_in, fan_out) = (pair[0], pair[1]);
                let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
                Layer {
                    w: DMatrix::from_fn(fan_out, fan_in, |_, _| f64_range(rng, -limit, limit)),
                    b: DVector::zeros(fan_out),
                }
            })
            .collect();
        Self { layers }
    }

    fn is_output(&self, l: usize) -> bool {
        l + 1 == self.layers.len()
    }

    /// Activations of every layer, input first.
    fn activations(&self, x: &DVector<f64>) -> Vec<DVector<f64>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(x.clone());
        for (l, layer) in self.layers.iter().enumerate() {
            let z = &layer.w * &acts[l] + &layer.b;
            acts.push(if self.is_output(l) { z } else { z.map(f64::tanh) });
        }
        acts
    }

    pub(crate) fn predict(&self, x: &[f64]) -> f64 {
        self.activations(&DVector::from_column_slice(x))
            .last()
            .map_or(0.0, |a| a[0])
    }

    /// Forward-mode value, gradient, and Hessian with respect to the input.
    pub(crate) fn derivatives(&self, x: &[f64], hessian: bool) -> Derivatives {
        let d = x.len();
        let mut a = DVector::from_column_slice(x);
        let mut ja = DMatrix::<f64>::identity(d, d);
        let mut ha: Vec<DMatrix<f64>> = if hessian {
            vec![DMatrix::zeros(d, d); d]
        } else {
            Vec::new()
        };

        for (l, layer) in self.layers.iter().enumerate() {
            let z = &layer.w * &a + &layer.b;
            let jz = &layer.w * &ja;
            let hz: Vec<DMatrix<f64>> = if hessian {
                (0..layer.w.nrows())
                    .map(|k| {
                        let mut acc = DMatrix::zeros(d, d);
                        for (m, h) in ha.iter().enumerate() {
                            acc += h * layer.w[(k, m)];
                        }
                        acc
                    })
                    .collect()
            } else {
                Vec::new()
            };

            if self.is_output(l) {
                a = z;
                ja = jz;
                ha = hz;
                continue;
            }

            let t = z.map(f64::tanh);
            let mut ja_next = jz.clone();
            let mut ha_next = Vec::with_capacity(hz.len());
            for k in 0..t.len() {
                let s1 = 1.0 - t[k] * t[k];
                let s2 = -2.0 * t[k] * s1;
                ja_next.row_mut(k).scale_mut(s1);
                if hessian {
                    let row = jz.row(k);
                    ha_next.push(row.transpose() * row * s2 + &hz[k] * s1);
                }
            }
            a = t;
            ja = ja_next;
            ha = ha_next;
        }

        Derivatives {
            value: a[0],
            gradient: ja.row(0).transpose(),
            hessian: ha.into_iter().next(),
        }
    }

    /// Full-batch Adam on mean squared error.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub(crate) fn train(&mut self, x: &[Vec<f64>], y: &[f64], config: &TrainConfig) -> f64 {
        const BETA1: f64 = 0.9;
        const BETA2: f64 = 0.999;
        const EPS: f64 = 1e-8;

        let inputs: Vec<DVector<f64>> = x.iter().map(|r| DVector::from_column_slice(r)).collect();
        let n = inputs.len().max(1) as f64;
        let mut moments: Vec<Moments> = self
            .layers
            .iter()
            .map(|layer| Moments {
                mw: DMatrix::zeros(layer.w.nrows(), layer.w.ncols()),
                vw: DMatrix::zeros(layer.w.nrows(), layer.w.ncols()),
                mb: DVector::zeros(layer.b.len()),
                vb: DVector::zeros(layer.b.len()),
            })
            .collect();

        let mut loss = f64::INFINITY;
        for epoch in 1..=config.epochs {
            let mut grad_w: Vec<DMatrix<f64>> = self
                .layers
                .iter()
                .map(|layer| DMatrix::zeros(layer.w.nrows(), layer.w.ncols()))
                .collect();
            let mut grad_b: Vec<DVector<f64>> = self.layers.iter().map(|layer| DVector::zeros(layer.b.len())).collect();
            let mut total = 0.0;

            for (xi, &yi) in inputs.iter().zip(y) {
                let acts = self.activations(xi);
                let residual = acts[self.layers.len()][0] - yi;
                total += residual * residual;

                let mut delta = DVector::from_element(1, 2.0 * residual / n);
                for l in (0..self.layers.len()).rev() {
                    grad_w[l] += &delta * acts[l].transpose();
                    grad_b[l] += &delta;
                    if l > 0 {
                        let back = self.layers[l].w.transpose() * &delta;
                        delta = back.zip_map(&acts[l], |g, a| g * (1.0 - a * a));
                    }
                }
            }
            loss = total / n;

            let t = epoch as i32;
            let bias1 = 1.0 - BETA1.powi(t);
            let bias2 = 1.0 - BETA2.powi(t);
            let lr = config.learning_rate;
            for ((layer, m), (gw, gb)) in self.layers.iter_mut().zip(&mut moments).zip(grad_w.iter().zip(&grad_b)) {
                m.mw = &m.mw * BETA1 + gw * (1.0 - BETA1);
                m.vw = &m.vw * BETA2 + gw.component_mul(gw) * (1.0 - BETA2);
                m.mb = &m.mb * BETA1 + gb * (1.0 - BETA1);
                m.vb = &m.vb * BETA2 + gb.component_mul(gb) * (1.0 - BETA2);
                layer.w -= m.mw.zip_map(&m.vw, |mw, vw| lr * (mw / bias1) / ((vw / bias2).sqrt() + EPS));
                layer.b -= m.mb.zip_map(&m.vb, |mb, vb| lr * (mb / bias1) / ((vb / bias2).sqrt() + EPS));
            }
        }
        loss
    }
}

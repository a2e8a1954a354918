mod buffer;
mod family;
mod uncertainty;

use mobo_core::normalization::{Normalization, TrainingSet};
use mobo_core::surrogate::{EvalRequest, Prediction, SurrogateModel};
use mobo_core::{Error, Result};

/// Surrogate answering from a fixed table; the first design coordinate is
/// the row index scaled by 0.1.
pub(crate) struct TableSurrogate {
    pub(crate) mean: Vec<Vec<f64>>,
    pub(crate) std: Vec<Vec<f64>>,
}

impl TableSurrogate {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn row(x: &[f64]) -> usize {
        (x[0] * 10.0).round() as usize
    }
}

impl SurrogateModel for TableSurrogate {
    fn fit(&mut self, _data: &TrainingSet, _rng: &mut fastrand::Rng) -> Result<()> {
        Ok(())
    }

    fn evaluate(&self, x: &[Vec<f64>], request: EvalRequest) -> Result<Prediction> {
        if request.gradient || request.hessian {
            return Err(Error::NotImplemented("table derivatives"));
        }
        let rows: Vec<usize> = x.iter().map(|p| Self::row(p)).collect();
        Ok(Prediction {
            mean: rows.iter().map(|&r| self.mean[r].clone()).collect(),
            std: request.std.then(|| rows.iter().map(|&r| self.std[r].clone()).collect()),
            ..Prediction::default()
        })
    }

    fn n_var(&self) -> usize {
        1
    }

    fn n_obj(&self) -> usize {
        self.mean.first().map_or(0, Vec::len)
    }
}

/// Identity normalization on `[0, 1]`.
pub(crate) fn unit_normalization() -> Normalization {
    let mut norm = Normalization::with_bounds(vec![0.0], vec![1.0]).unwrap();
    norm.fit(&[vec![0.0], vec![1.0]], &[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap();
    norm
}

/// Designs `0.0, 0.1, ...` addressing rows of a [`TableSurrogate`].
pub(crate) fn table_designs(n: usize) -> Vec<Vec<f64>> {
    (0..n).map(|i| vec![f64::from(u32::try_from(i).unwrap()) * 0.1]).collect()
}

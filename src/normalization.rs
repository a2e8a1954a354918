//! Stateful scalers for the design and performance spaces.
//!
//! Two independent scalers are fitted at the start of every round:
//!
//! - [`BoundedScaler`] maps continuous designs into `[0, 1]` using a
//!   bounding box (the problem's bounds when known, the data's otherwise).
//! - [`StandardScaler`] maps objective values to zero mean and unit
//!   variance.
//!
//! Each scaler distinguishes the affine transform (`transform` /
//! `inverse_transform`) from the purely multiplicative one (`scale` /
//! `rescale`). Derivatives must go through the multiplicative form:
//! gradients and Hessians are never shifted.
//!
//! Design values are clipped into `[0, 1]` on the way in and into the
//! original bounds on the way out, so the round trip is only exact inside
//! the bounds.

use nalgebra::DMatrix;

use crate::error::{Error, Result, check_dim};
use crate::surrogate::safe_divide;

/// Min-max scaler mapping a bounding box onto the unit cube.
#[derive(Clone, Debug, Default)]
pub struct BoundedScaler {
    fixed: Option<(Vec<f64>, Vec<f64>)>,
    fitted: Option<(Vec<f64>, Vec<f64>)>,
}

impl BoundedScaler {
    /// Creates a scaler whose bounds are the data's bounding box at fit time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scaler with fixed bounds.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if the bound vectors differ in
    /// length and `Error::InvalidBounds` if any `lower > upper`.
    pub fn with_bounds(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        check_dim("scaler bounds", lower.len(), upper.len())?;
        if let Some((&low, &high)) = lower.iter().zip(&upper).find(|(l, u)| l > u) {
            return Err(Error::InvalidBounds { low, high });
        }
        Ok(Self {
            fixed: Some((lower, upper)),
            fitted: None,
        })
    }

    /// Fit the scaler.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyDataset` without fixed bounds and no data, or
    /// `Error::DimensionMismatch` if the data width disagrees with the bounds.
    pub fn fit(&mut self, x: &[Vec<f64>]) -> Result<()> {
        if let Some((lower, upper)) = &self.fixed {
            for row in x {
                check_dim("design width", lower.len(), row.len())?;
            }
            self.fitted = Some((lower.clone(), upper.clone()));
            return Ok(());
        }
        let first = x.first().ok_or(Error::EmptyDataset)?;
        let mut lower = first.clone();
        let mut upper = first.clone();
        for row in x {
            check_dim("design width", lower.len(), row.len())?;
            for (j, &v) in row.iter().enumerate() {
                lower[j] = lower[j].min(v);
                upper[j] = upper[j].max(v);
            }
        }
        self.fitted = Some((lower, upper));
        Ok(())
    }

    fn bounds(&self) -> Result<(&[f64], &[f64])> {
        self.fitted
            .as_ref()
            .map(|(l, u)| (l.as_slice(), u.as_slice()))
            .ok_or(Error::NotFitted {
                component: "design scaler",
            })
    }

    /// The fitted bounds `(lower, upper)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit).
    pub fn fitted_bounds(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        let (l, u) = self.bounds()?;
        Ok((l.to_vec(), u.to_vec()))
    }

    /// Map raw designs into `[0, 1]`, clipping out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit) and
    /// `Error::DimensionMismatch` on width mismatch.
    pub fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let (lower, upper) = self.bounds()?;
        x.iter()
            .map(|row| {
                check_dim("design width", lower.len(), row.len())?;
                Ok(row
                    .iter()
                    .zip(lower.iter().zip(upper))
                    .map(|(&v, (&l, &u))| safe_divide(v - l, u - l).clamp(0.0, 1.0))
                    .collect())
            })
            .collect()
    }

    /// Map normalized designs back to raw units, clipping into the bounds.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit) and
    /// `Error::DimensionMismatch` on width mismatch.
    pub fn inverse_transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let (lower, upper) = self.bounds()?;
        x.iter()
            .map(|row| {
                check_dim("design width", lower.len(), row.len())?;
                Ok(row
                    .iter()
                    .zip(lower.iter().zip(upper))
                    .map(|(&v, (&l, &u))| (l + v * (u - l)).clamp(l, u))
                    .collect())
            })
            .collect()
    }

    /// Multiply a raw-unit derivative row into normalized units.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit).
    pub fn scale(&self, v: &[f64]) -> Result<Vec<f64>> {
        let (lower, upper) = self.bounds()?;
        check_dim("design width", lower.len(), v.len())?;
        Ok(v.iter()
            .zip(lower.iter().zip(upper))
            .map(|(&d, (&l, &u))| d * (u - l))
            .collect())
    }

    /// Inverse of [`scale`](Self::scale).
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit).
    pub fn rescale(&self, v: &[f64]) -> Result<Vec<f64>> {
        let (lower, upper) = self.bounds()?;
        check_dim("design width", lower.len(), v.len())?;
        Ok(v.iter()
            .zip(lower.iter().zip(upper))
            .map(|(&d, (&l, &u))| safe_divide(d, u - l))
            .collect())
    }
}

/// Zero-mean, unit-variance scaler for objective values.
#[derive(Clone, Debug, Default)]
pub struct StandardScaler {
    fitted: Option<(Vec<f64>, Vec<f64>)>,
}

impl StandardScaler {
    /// Creates an unfitted scaler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit mean and (population) standard deviation per column.
    ///
    /// Columns with zero spread get unit scale.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyDataset` for empty input and
    /// `Error::DimensionMismatch` for ragged rows.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(&mut self, y: &[Vec<f64>]) -> Result<()> {
        let first = y.first().ok_or(Error::EmptyDataset)?;
        let m = first.len();
        let n = y.len() as f64;
        let mut mean = vec![0.0; m];
        for row in y {
            check_dim("objective width", m, row.len())?;
            for (acc, &v) in mean.iter_mut().zip(row) {
                *acc += v / n;
            }
        }
        let mut scale = vec![0.0; m];
        for row in y {
            for ((acc, &v), &mu) in scale.iter_mut().zip(row).zip(&mean) {
                *acc += (v - mu).powi(2) / n;
            }
        }
        for s in &mut scale {
            *s = if *s > 0.0 { s.sqrt() } else { 1.0 };
        }
        self.fitted = Some((mean, scale));
        Ok(())
    }

    fn params(&self) -> Result<(&[f64], &[f64])> {
        self.fitted
            .as_ref()
            .map(|(m, s)| (m.as_slice(), s.as_slice()))
            .ok_or(Error::NotFitted {
                component: "performance scaler",
            })
    }

    /// Fitted per-objective means.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit).
    pub fn mean(&self) -> Result<&[f64]> {
        Ok(self.params()?.0)
    }

    /// Fitted per-objective scales.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit).
    pub fn scale_factors(&self) -> Result<&[f64]> {
        Ok(self.params()?.1)
    }

    /// Standardize objective values.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit).
    pub fn transform(&self, y: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let (mean, scale) = self.params()?;
        y.iter()
            .map(|row| {
                check_dim("objective width", mean.len(), row.len())?;
                Ok(row
                    .iter()
                    .zip(mean.iter().zip(scale))
                    .map(|(&v, (&m, &s))| (v - m) / s)
                    .collect())
            })
            .collect()
    }

    /// Map standardized values back to raw units.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit).
    pub fn inverse_transform(&self, y: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let (mean, scale) = self.params()?;
        y.iter()
            .map(|row| {
                check_dim("objective width", mean.len(), row.len())?;
                Ok(row
                    .iter()
                    .zip(mean.iter().zip(scale))
                    .map(|(&v, (&m, &s))| v * s + m)
                    .collect())
            })
            .collect()
    }

    /// Divide raw-unit quantities (std, derivatives) into normalized units.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit).
    pub fn scale(&self, v: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let (_, scale) = self.params()?;
        v.iter()
            .map(|row| {
                check_dim("objective width", scale.len(), row.len())?;
                Ok(row.iter().zip(scale).map(|(&d, &s)| d / s).collect())
            })
            .collect()
    }

    /// Multiply normalized quantities (std, derivatives) into raw units.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit).
    pub fn rescale(&self, v: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let (_, scale) = self.params()?;
        v.iter()
            .map(|row| {
                check_dim("objective width", scale.len(), row.len())?;
                Ok(row.iter().zip(scale).map(|(&d, &s)| d * s).collect())
            })
            .collect()
    }

    /// Rescale a gradient matrix (one row per objective) in place.
    pub(crate) fn rescale_rows(&self, m: &mut DMatrix<f64>) -> Result<()> {
        let (_, scale) = self.params()?;
        check_dim("gradient rows", scale.len(), m.nrows())?;
        for (mut row, &s) in m.row_iter_mut().zip(scale) {
            row *= s;
        }
        Ok(())
    }

    /// Factor by which objective `j` is multiplied on the way back to raw units.
    pub(crate) fn factor(&self, j: usize) -> Result<f64> {
        let (_, scale) = self.params()?;
        scale.get(j).copied().ok_or(Error::DimensionMismatch {
            what: "objective index",
            expected: scale.len(),
            got: j,
        })
    }
}

/// Normalized training data handed to surrogates and acquisitions.
///
/// Carries the fitted performance scaler so models can report
/// predictions back in raw units.
#[derive(Clone, Debug)]
pub struct TrainingSet {
    /// Designs in `[0, 1]^n_var`.
    pub x: Vec<Vec<f64>>,
    /// Standardized objective values.
    pub y: Vec<Vec<f64>>,
    /// Scaler that produced `y`.
    pub y_scaler: StandardScaler,
}

impl TrainingSet {
    /// Number of training points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns `true` for an empty training set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Dimensionality of the normalized designs.
    #[must_use]
    pub fn n_var(&self) -> usize {
        self.x.first().map_or(0, Vec::len)
    }

    /// Number of objectives.
    #[must_use]
    pub fn n_obj(&self) -> usize {
        self.y.first().map_or(0, Vec::len)
    }

    /// Objective values in raw units.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` if the scaler was never fitted.
    pub fn y_raw(&self) -> Result<Vec<Vec<f64>>> {
        self.y_scaler.inverse_transform(&self.y)
    }

    /// Column `j` of the standardized objectives.
    #[must_use]
    pub fn y_column(&self, j: usize) -> Vec<f64> {
        self.y.iter().map(|row| row[j]).collect()
    }
}

/// Paired design and performance scalers.
#[derive(Clone, Debug, Default)]
pub struct Normalization {
    x: BoundedScaler,
    y: StandardScaler,
}

impl Normalization {
    /// Creates a normalization using the data bounding box for designs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a normalization with fixed design bounds.
    ///
    /// # Errors
    ///
    /// Propagates [`BoundedScaler::with_bounds`] errors.
    pub fn with_bounds(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        Ok(Self {
            x: BoundedScaler::with_bounds(lower, upper)?,
            y: StandardScaler::new(),
        })
    }

    /// Fit both scalers.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if `x` and `y` differ in length,
    /// plus any scaler fitting error.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[Vec<f64>]) -> Result<()> {
        check_dim("dataset rows", x.len(), y.len())?;
        self.x.fit(x)?;
        self.y.fit(y)
    }

    /// The design scaler.
    #[must_use]
    pub fn x_scaler(&self) -> &BoundedScaler {
        &self.x
    }

    /// The performance scaler.
    #[must_use]
    pub fn y_scaler(&self) -> &StandardScaler {
        &self.y
    }

    /// Forward-transform designs.
    ///
    /// # Errors
    ///
    /// See [`BoundedScaler::transform`].
    pub fn do_x(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.x.transform(x)
    }

    /// Forward-transform objective values.
    ///
    /// # Errors
    ///
    /// See [`StandardScaler::transform`].
    pub fn do_y(&self, y: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.y.transform(y)
    }

    /// Inverse-transform designs.
    ///
    /// # Errors
    ///
    /// See [`BoundedScaler::inverse_transform`].
    pub fn undo_x(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.x.inverse_transform(x)
    }

    /// Inverse-transform objective values.
    ///
    /// # Errors
    ///
    /// See [`StandardScaler::inverse_transform`].
    pub fn undo_y(&self, y: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.y.inverse_transform(y)
    }

    /// Purely multiplicative forward transform of objective-space quantities.
    ///
    /// # Errors
    ///
    /// See [`StandardScaler::scale`].
    pub fn scale_y(&self, v: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.y.scale(v)
    }

    /// Purely multiplicative inverse transform of objective-space quantities.
    ///
    /// # Errors
    ///
    /// See [`StandardScaler::rescale`].
    pub fn rescale_y(&self, v: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.y.rescale(v)
    }

    /// Build the normalized training set for this round.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFitted` before [`fit`](Self::fit).
    pub fn training_set(&self, x: &[Vec<f64>], y: &[Vec<f64>]) -> Result<TrainingSet> {
        check_dim("dataset rows", x.len(), y.len())?;
        Ok(TrainingSet {
            x: self.do_x(x)?,
            y: self.do_y(y)?,
            y_scaler: self.y.clone(),
        })
    }
}

//! Design-space definition and the raw ↔ continuous encoding.
//!
//! Raw designs may mix float, integer, and categorical variables. Every
//! numeric stage of the optimizer works on a purely continuous encoding:
//!
//! | Variable | Encoded as |
//! |----------|------------|
//! | `Float` | the value itself (its logarithm when log-scaled) |
//! | `Int` | the value as `f64` |
//! | `Categorical` | a one-hot block of `n_choices` columns in `[0, 1]` |
//!
//! Decoding rounds integers, takes the arg-max of each one-hot block, and
//! clamps everything into the declared bounds, so any continuous vector
//! (e.g. one proposed by the inner search) decodes to a valid design.
//!
//! # Example
//!
//! ```
//! use mobo_core::design::{DesignSpace, ParamValue};
//!
//! let space = DesignSpace::new()
//!     .float(0.0, 1.0)
//!     .unwrap()
//!     .int(1, 5)
//!     .unwrap()
//!     .categorical(3)
//!     .unwrap();
//! assert_eq!(space.n_var(), 5);
//!
//! let raw = vec![vec![
//!     ParamValue::Float(0.25),
//!     ParamValue::Int(3),
//!     ParamValue::Categorical(2),
//! ]];
//! let x = space.encode(&raw).unwrap();
//! assert_eq!(x[0], vec![0.25, 3.0, 0.0, 0.0, 1.0]);
//! assert_eq!(space.decode(&x).unwrap(), raw);
//! ```

use crate::error::{Error, Result};
use crate::rng_util;

/// A floating-point design variable.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FloatVariable {
    /// Lower bound (inclusive).
    pub low: f64,
    /// Upper bound (inclusive).
    pub high: f64,
    /// Whether the variable is encoded in log space.
    pub log_scale: bool,
}

/// An integer design variable.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntVariable {
    /// Lower bound (inclusive).
    pub low: i64,
    /// Upper bound (inclusive).
    pub high: i64,
}

/// A categorical design variable.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CategoricalVariable {
    /// Number of choices available.
    pub n_choices: usize,
}

/// Enum wrapping all design variable types.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Variable {
    /// A floating-point variable.
    Float(FloatVariable),
    /// An integer variable.
    Int(IntVariable),
    /// A categorical variable.
    Categorical(CategoricalVariable),
}

impl Variable {
    /// Number of continuous columns this variable occupies once encoded.
    #[must_use]
    pub fn encoded_width(&self) -> usize {
        match self {
            Variable::Float(_) | Variable::Int(_) => 1,
            Variable::Categorical(c) => c.n_choices,
        }
    }
}

/// A raw design value.
///
/// For categorical variables, the `Categorical` variant stores the index
/// into the choices.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamValue {
    /// A floating-point value.
    Float(f64),
    /// An integer value.
    Int(i64),
    /// A categorical value, stored as an index into the choices.
    Categorical(usize),
}

/// Ordered list of design variables with the continuous encoding.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DesignSpace {
    variables: Vec<Variable>,
}

impl DesignSpace {
    /// Creates an empty design space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a space of `n` float variables sharing the bounds `[low, high]`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBounds` if `low > high`.
    pub fn continuous(n: usize, low: f64, high: f64) -> Result<Self> {
        (0..n).try_fold(Self::new(), |space, _| space.float(low, high))
    }

    /// Appends a float variable on `[low, high]`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBounds` if `low > high`.
    pub fn float(self, low: f64, high: f64) -> Result<Self> {
        self.push_float(low, high, false)
    }

    /// Appends a log-scaled float variable on `[low, high]`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBounds` if `low > high` and
    /// `Error::InvalidConfig` if `low` is not positive.
    pub fn log_float(self, low: f64, high: f64) -> Result<Self> {
        if low <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "log-scaled variable needs a positive lower bound, got {low}"
            )));
        }
        self.push_float(low, high, true)
    }

    /// Appends an integer variable on `[low, high]`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBounds` if `low > high`.
    #[allow(clippy::cast_precision_loss)]
    pub fn int(mut self, low: i64, high: i64) -> Result<Self> {
        if low > high {
            return Err(Error::InvalidBounds {
                low: low as f64,
                high: high as f64,
            });
        }
        self.variables.push(Variable::Int(IntVariable { low, high }));
        Ok(self)
    }

    /// Appends a categorical variable with `n_choices` options.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `n_choices` is zero.
    pub fn categorical(mut self, n_choices: usize) -> Result<Self> {
        if n_choices == 0 {
            return Err(Error::InvalidConfig(
                "categorical variable needs at least one choice".into(),
            ));
        }
        self.variables
            .push(Variable::Categorical(CategoricalVariable { n_choices }));
        Ok(self)
    }

    fn push_float(mut self, low: f64, high: f64, log_scale: bool) -> Result<Self> {
        if low > high || !low.is_finite() || !high.is_finite() {
            return Err(Error::InvalidBounds { low, high });
        }
        self.variables.push(Variable::Float(FloatVariable {
            low,
            high,
            log_scale,
        }));
        Ok(self)
    }

    /// The declared variables, in order.
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Number of raw variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` if no variable was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Dimensionality of the continuous encoding.
    #[must_use]
    pub fn n_var(&self) -> usize {
        self.variables.iter().map(Variable::encoded_width).sum()
    }

    /// Lower and upper bounds of the continuous encoding.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn continuous_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let mut lower = Vec::with_capacity(self.n_var());
        let mut upper = Vec::with_capacity(self.n_var());
        for var in &self.variables {
            match var {
                Variable::Float(f) if f.log_scale => {
                    lower.push(f.low.ln());
                    upper.push(f.high.ln());
                }
                Variable::Float(f) => {
                    lower.push(f.low);
                    upper.push(f.high);
                }
                Variable::Int(i) => {
                    lower.push(i.low as f64);
                    upper.push(i.high as f64);
                }
                Variable::Categorical(c) => {
                    lower.extend(core::iter::repeat_n(0.0, c.n_choices));
                    upper.extend(core::iter::repeat_n(1.0, c.n_choices));
                }
            }
        }
        (lower, upper)
    }

    /// Map raw designs to continuous vectors.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if a design has the wrong number
    /// of values and `Error::InvalidConfig` if a value's type does not
    /// match its variable.
    #[allow(clippy::cast_precision_loss)]
    pub fn encode(&self, designs: &[Vec<ParamValue>]) -> Result<Vec<Vec<f64>>> {
        designs
            .iter()
            .map(|design| {
                crate::error::check_dim("design variables", self.len(), design.len())?;
                let mut row = Vec::with_capacity(self.n_var());
                for (value, var) in design.iter().zip(&self.variables) {
                    match (value, var) {
                        (ParamValue::Float(v), Variable::Float(f)) => {
                            row.push(if f.log_scale { v.ln() } else { *v });
                        }
                        (ParamValue::Int(v), Variable::Int(_)) => row.push(*v as f64),
                        (ParamValue::Categorical(k), Variable::Categorical(c))
                            if *k < c.n_choices =>
                        {
                            row.extend((0..c.n_choices).map(|j| if j == *k { 1.0 } else { 0.0 }));
                        }
                        _ => {
                            return Err(Error::InvalidConfig(format!(
                                "value {value:?} does not fit variable {var:?}"
                            )));
                        }
                    }
                }
                Ok(row)
            })
            .collect()
    }

    /// Map continuous vectors back to raw designs, clamping to bounds.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if a vector's length differs from
    /// [`n_var`](Self::n_var).
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn decode(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<ParamValue>>> {
        x.iter()
            .map(|row| {
                crate::error::check_dim("encoded design", self.n_var(), row.len())?;
                let mut col = 0;
                let mut design = Vec::with_capacity(self.len());
                for var in &self.variables {
                    match var {
                        Variable::Float(f) => {
                            let v = if f.log_scale { row[col].exp() } else { row[col] };
                            design.push(ParamValue::Float(v.clamp(f.low, f.high)));
                        }
                        Variable::Int(i) => {
                            let v = (row[col].round() as i64).clamp(i.low, i.high);
                            design.push(ParamValue::Int(v));
                        }
                        Variable::Categorical(c) => {
                            let block = &row[col..col + c.n_choices];
                            let best = block
                                .iter()
                                .enumerate()
                                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(core::cmp::Ordering::Equal))
                                .map_or(0, |(k, _)| k);
                            design.push(ParamValue::Categorical(best));
                        }
                    }
                    col += var.encoded_width();
                }
                Ok(design)
            })
            .collect()
    }

    /// Sample `n` raw designs uniformly at random.
    #[must_use]
    pub fn sample_random(&self, rng: &mut fastrand::Rng, n: usize) -> Vec<Vec<ParamValue>> {
        (0..n)
            .map(|_| {
                self.variables
                    .iter()
                    .map(|var| match var {
                        Variable::Float(f) if f.log_scale => ParamValue::Float(
                            rng_util::f64_range(rng, f.low.ln(), f.high.ln()).exp(),
                        ),
                        Variable::Float(f) => {
                            ParamValue::Float(rng_util::f64_range(rng, f.low, f.high))
                        }
                        Variable::Int(i) => ParamValue::Int(rng.i64(i.low..=i.high)),
                        Variable::Categorical(c) => ParamValue::Categorical(rng.usize(0..c.n_choices)),
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_bounds() {
        assert!(matches!(
            DesignSpace::new().float(2.0, 1.0),
            Err(Error::InvalidBounds { .. })
        ));
        assert!(DesignSpace::new().log_float(0.0, 1.0).is_err());
        assert!(DesignSpace::new().categorical(0).is_err());
    }

    #[test]
    fn test_log_scale_round_trip() {
        let space = DesignSpace::new().log_float(1e-3, 1e3).unwrap();
        let (lo, hi) = space.continuous_bounds();
        assert!((lo[0] - 1e-3_f64.ln()).abs() < 1e-12);
        assert!((hi[0] - 1e3_f64.ln()).abs() < 1e-12);

        let raw = vec![vec![ParamValue::Float(10.0)]];
        let x = space.encode(&raw).unwrap();
        let back = space.decode(&x).unwrap();
        let ParamValue::Float(v) = back[0][0] else {
            panic!("expected float");
        };
        assert!((v - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_clamps_and_rounds() {
        let space = DesignSpace::new().int(0, 4).unwrap().categorical(2).unwrap();
        let decoded = space.decode(&[vec![7.6, 0.2, 0.9]]).unwrap();
        assert_eq!(decoded[0], vec![ParamValue::Int(4), ParamValue::Categorical(1)]);
    }

    #[test]
    fn test_encode_rejects_wrong_type() {
        let space = DesignSpace::new().int(0, 4).unwrap();
        assert!(space.encode(&[vec![ParamValue::Float(1.0)]]).is_err());
        assert!(matches!(
            space.encode(&[vec![]]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_sample_random_in_bounds() {
        let space = DesignSpace::new()
            .float(-1.0, 1.0)
            .unwrap()
            .int(3, 5)
            .unwrap()
            .categorical(4)
            .unwrap();
        let mut rng = fastrand::Rng::with_seed(1);
        for design in space.sample_random(&mut rng, 50) {
            match (&design[0], &design[1], &design[2]) {
                (ParamValue::Float(f), ParamValue::Int(i), ParamValue::Categorical(c)) => {
                    assert!((-1.0..=1.0).contains(f));
                    assert!((3..=5).contains(i));
                    assert!(*c < 4);
                }
                other => panic!("unexpected design {other:?}"),
            }
        }
    }
}

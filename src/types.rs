//! Core data types shared across the optimizer.

use crate::design::ParamValue;
use crate::error::{Error, Result, check_dim};

/// Evaluated designs and their objective values, as parallel arrays.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dataset {
    x: Vec<Vec<ParamValue>>,
    y: Vec<Vec<f64>>,
}

impl Dataset {
    /// Creates a dataset from parallel design and objective arrays.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if the arrays differ in length or
    /// the objective rows have inconsistent widths.
    pub fn new(x: Vec<Vec<ParamValue>>, y: Vec<Vec<f64>>) -> Result<Self> {
        check_dim("dataset rows", x.len(), y.len())?;
        if let Some(first) = y.first() {
            for row in &y {
                check_dim("objective values", first.len(), row.len())?;
            }
        }
        Ok(Self { x, y })
    }

    /// Appends one evaluated design.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if `y` has a different number of
    /// objectives than the stored rows.
    pub fn push(&mut self, x: Vec<ParamValue>, y: Vec<f64>) -> Result<()> {
        if let Some(first) = self.y.first() {
            check_dim("objective values", first.len(), y.len())?;
        }
        self.x.push(x);
        self.y.push(y);
        Ok(())
    }

    /// Appends a batch of evaluated designs.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` on length or width mismatch.
    pub fn extend(&mut self, x: Vec<Vec<ParamValue>>, y: Vec<Vec<f64>>) -> Result<()> {
        check_dim("dataset rows", x.len(), y.len())?;
        for (xi, yi) in x.into_iter().zip(y) {
            self.push(xi, yi)?;
        }
        Ok(())
    }

    /// Raw designs.
    #[must_use]
    pub fn x(&self) -> &[Vec<ParamValue>] {
        &self.x
    }

    /// Objective values.
    #[must_use]
    pub fn y(&self) -> &[Vec<f64>] {
        &self.y
    }

    /// Number of evaluated designs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns `true` if nothing has been evaluated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Number of objectives, or `None` for an empty dataset.
    #[must_use]
    pub fn n_obj(&self) -> Option<usize> {
        self.y.first().map(Vec::len)
    }

    pub(crate) fn require_non_empty(&self) -> Result<()> {
        if self.is_empty() {
            Err(Error::EmptyDataset)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a scaler, surrogate, or acquisition is used before `fit`.
    #[error("{component} used before fit")]
    NotFitted {
        /// The component that was not fitted.
        component: &'static str,
    },

    /// Returned when a combination of components cannot work together,
    /// or a string tag names no known variant.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Returned when an operation has no implementation for the requested
    /// form (e.g. derivatives of a penalized acquisition).
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Returned when an array's dimensionality disagrees with the problem.
    #[error("dimension mismatch in {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// What was being checked.
        what: &'static str,
        /// The expected dimensionality.
        expected: usize,
        /// The actual dimensionality.
        got: usize,
    },

    /// Returned when fitting on an empty dataset.
    #[error("dataset is empty")]
    EmptyDataset,

    /// Returned when the lower bound is greater than the upper bound.
    #[error("invalid bounds: low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when a configuration value is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when a matrix factorization fails even after jitter.
    #[error("linear algebra failure: {0}")]
    LinearAlgebra(&'static str),

    /// Returned when every parallel worker of a round failed or timed out.
    #[cfg(feature = "async")]
    #[error("async task error: {0}")]
    TaskError(String),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Check that `got` matches `expected`, naming the checked quantity.
pub(crate) fn check_dim(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            what,
            expected,
            got,
        })
    }
}

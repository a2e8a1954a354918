//! The problem collaborator contract.
//!
//! The core never evaluates objectives itself; it only needs the
//! problem's dimensionality and the encoding of its design space.

use crate::design::{DesignSpace, ParamValue};
use crate::error::Result;

/// Trait for the problem being optimized.
///
/// Objectives are always minimized. Implementors only need to expose a
/// [`DesignSpace`] and the number of objectives; encoding, decoding, and
/// bounds are derived from the design space.
pub trait Problem: Send + Sync {
    /// The design space of raw design vectors.
    fn design_space(&self) -> &DesignSpace;

    /// Number of objectives.
    fn n_obj(&self) -> usize;

    /// Dimensionality of the continuous design encoding.
    fn n_var(&self) -> usize {
        self.design_space().n_var()
    }

    /// Continuous design bounds `(lower, upper)`.
    fn var_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        self.design_space().continuous_bounds()
    }

    /// Known objective bounds `(lower, upper)`, if any.
    fn objective_bounds(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        None
    }

    /// Map raw designs to the continuous encoding.
    ///
    /// # Errors
    ///
    /// Propagates encoding errors from the design space.
    fn encode(&self, x: &[Vec<ParamValue>]) -> Result<Vec<Vec<f64>>> {
        self.design_space().encode(x)
    }

    /// Map continuous vectors back to raw designs.
    ///
    /// # Errors
    ///
    /// Propagates decoding errors from the design space.
    fn decode(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<ParamValue>>> {
        self.design_space().decode(x)
    }
}

/// A problem defined only by its design space and objective count.
///
/// Useful when the objectives are evaluated elsewhere and the core only
/// proposes batches.
#[derive(Clone, Debug)]
pub struct SimpleProblem {
    space: DesignSpace,
    n_obj: usize,
    objective_bounds: Option<(Vec<f64>, Vec<f64>)>,
}

impl SimpleProblem {
    /// Creates a problem over `space` with `n_obj` objectives.
    #[must_use]
    pub fn new(space: DesignSpace, n_obj: usize) -> Self {
        Self {
            space,
            n_obj,
            objective_bounds: None,
        }
    }

    /// Declares known objective bounds.
    #[must_use]
    pub fn with_objective_bounds(mut self, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        self.objective_bounds = Some((lower, upper));
        self
    }
}

impl Problem for SimpleProblem {
    fn design_space(&self) -> &DesignSpace {
        &self.space
    }

    fn n_obj(&self) -> usize {
        self.n_obj
    }

    fn objective_bounds(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        self.objective_bounds.clone()
    }
}

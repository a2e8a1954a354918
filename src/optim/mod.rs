//! Numerical optimization routines used inside the surrogate and
//! acquisition layers.

pub mod lbfgs;

pub use lbfgs::{LbfgsConfig, Minimum, minimize, multistart};

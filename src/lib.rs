#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Surrogate-assisted multi-objective batch optimization.
//!
//! Each round fits a probabilistic surrogate of every objective on the
//! evaluated history, turns it into an acquisition function, searches the
//! acquisition with a population-based inner optimizer, and selects a batch
//! of designs to evaluate next. Objectives are always minimized.
//!
//! # Getting Started
//!
//! ```
//! use mobo_core::prelude::*;
//!
//! let space = DesignSpace::continuous(2, 0.0, 1.0).unwrap();
//! let mobo = Mobo::builder(SimpleProblem::new(space, 2))
//!     .preset(AlgorithmPreset::Dgemo)
//!     .batch_size(3)
//!     .pop_size(20)
//!     .n_gen(3)
//!     .seed(42)
//!     .build()
//!     .unwrap();
//!
//! let mut data = Dataset::default();
//! for i in 0..6 {
//!     let t = f64::from(i) / 5.0;
//!     data.push(vec![ParamValue::Float(t), ParamValue::Float(0.5)], vec![t, 1.0 - t.sqrt()])
//!         .unwrap();
//! }
//!
//! let proposal = mobo.propose(&data).unwrap();
//! assert_eq!(proposal.x.len(), 3);
//! ```
//!
//! # Components
//!
//! | Stage | Trait | Implementations |
//! |-------|-------|-----------------|
//! | Surrogate | [`SurrogateModel`](surrogate::SurrogateModel) | Gaussian process, neural network, ensemble network |
//! | Acquisition | [`Acquisition`](acquisition::Acquisition) | identity, EI, PI, UCB, Thompson sampling, local penalization |
//! | Inner search | [`InnerSearch`](solver::InnerSearch) | NSGA-II, parallel Tchebycheff (`async`) |
//! | Selection | [`Selection`](selection::Selection) | random, uncertainty, cluster, family-aware hypervolume |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `async` | [`ScalarizedSolver`](solver::ScalarizedSolver) on a bounded tokio pool | off |
//! | `serde` | `Serialize`/`Deserialize` on configuration types | off |
//! | `sobol` | Sobol initial sampling | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at key points of a round | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

pub mod acquisition;
pub mod decomposition;
pub mod design;
mod error;
mod kmeans;
pub mod normalization;
pub mod optim;
pub mod optimizer;
pub mod pareto;
pub mod problem;
mod rng_util;
pub mod sampling;
pub mod selection;
pub mod solver;
pub mod surrogate;
pub mod types;

pub use error::{Error, Result};
pub use optimizer::{AlgorithmPreset, Mobo, MoboBuilder, MoboConfig, Proposal};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use mobo_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::acquisition::{Acquisition, AcquisitionKind};
    pub use crate::design::{DesignSpace, ParamValue};
    pub use crate::error::{Error, Result};
    pub use crate::optimizer::{AlgorithmPreset, Mobo, MoboBuilder, MoboConfig, Proposal};
    pub use crate::problem::{Problem, SimpleProblem};
    pub use crate::sampling::InitialSampling;
    pub use crate::selection::{Selection, SelectionKind};
    #[cfg(feature = "async")]
    pub use crate::solver::ScalarizedSolver;
    pub use crate::solver::{InnerSearch, Nsga2Search, Solver};
    pub use crate::surrogate::{Kernel, SurrogateKind, SurrogateModel};
    pub use crate::types::Dataset;
}

//! # Thermolin
//!
//! $$
//! dX_t = (b - AX_t)\,dt + \sqrt{2D}\,dW_t
//! $$
//!
//! Monte Carlo linear algebra: instead of factorizing a matrix, simulate a
//! multivariate Ornstein-Uhlenbeck (OU) process whose stationary statistics
//! equal the quantity of interest and average over the trajectory.
//!
//! | Quantity            | Estimator                              | Entry point  |
//! |---------------------|----------------------------------------|--------------|
//! | `x` with `Ax = b`   | stationary mean                        | [`solve`]    |
//! | `A⁻¹`               | stationary covariance (`D = I`)        | [`inv`]      |
//! | `exp(-A·lag·dt)`    | lagged autocovariance, `Σ` divided out | [`expnegm`]  |
//!
//! ## Modules
//!
//! | Module        | Description                                                          |
//! |---------------|----------------------------------------------------------------------|
//! | [`matfn`]     | Eigendecomposition of the drift, Lyapunov solve, cached `exp(-Aτ)`.  |
//! | [`process`]   | Exact finite-step OU transition sampler (no Euler discretization).   |
//! | [`estimator`] | Single-pass online accumulators: mean, covariance, lagged covariance.|
//! | [`estimate`]  | Orchestration: validation, parallel chains, the public operations.   |
//! | [`error`]     | Failure taxonomy surfaced before or during setup.                    |
//!
//! ## Parallelism
//!
//! One trajectory is a Markov chain and therefore strictly sequential.
//! Throughput comes from independent chains (`EstimateConfig::chains`),
//! sampled in parallel with `rayon` and merged at finalization. Per-chain RNGs
//! are derived from the call seed, so a fixed seed and chain count reproduce
//! results bit for bit.
//!
//! ## Example
//!
//! ```rust
//! use ndarray::array;
//! use thermolin::estimate::EstimateConfig;
//!
//! let a = array![[2.0, 0.0], [0.0, 3.0]];
//! let b = array![1.0, 1.0];
//! let x = thermolin::solve(&a, &b, None, &EstimateConfig::default()).unwrap();
//! // x ≈ A⁻¹ b = [0.5, 1/3]
//! ```

pub mod error;
pub mod estimate;
pub mod estimator;
pub mod matfn;
pub mod process;
pub mod traits;

pub use crate::error::EstimateError;
pub use crate::error::Result;
pub use crate::estimate::expnegm;
pub use crate::estimate::inv;
pub use crate::estimate::solve;
pub use crate::estimate::EstimateConfig;
pub use crate::matfn::MatrixFunctionCache;

/// Default step size of the exact transition.
pub const DT: f64 = 0.1;
/// Default number of accumulated samples.
pub const NUM_SAMPLES: usize = 10_000;
/// Default number of discarded warm-up steps.
pub const BURN_IN: usize = 0;
/// Default autocovariance lag (in steps).
pub const LAG: usize = 1;
/// Default number of independent chains.
pub const CHAINS: usize = 1;

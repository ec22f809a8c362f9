//! # Errors
//!
//! $$
//! \text{Re}\,\lambda_i(A) > 0,\qquad \Sigma \succeq 0,\qquad Q \succeq 0
//! $$
//!
//! Every failure is detected deterministically before or during setup; once a
//! validated transition pair exists, sampling itself cannot fail.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EstimateError>;

#[derive(Debug, Error)]
pub enum EstimateError {
  /// Inconsistent dimensions between `A`, `b` and `D`.
  #[error("shape mismatch: {0}")]
  ShapeMismatch(String),

  /// The drift matrix has an eigenvalue with non-positive real part, so the
  /// OU process has no stationary law and the requested estimator is
  /// undefined.
  #[error("non-stationary drift: eigenvalue {re}{im:+}i has non-positive real part")]
  NonStationaryDrift { re: f64, im: f64 },

  /// A derived covariance failed the positive-semidefiniteness check beyond
  /// tolerance, typically from a near-singular drift or a too-large step.
  #[error("{matrix} has negative eigenvalue {eigenvalue:.3e}; reduce dt or check the conditioning of the drift matrix")]
  NumericalInstability { matrix: &'static str, eigenvalue: f64 },

  /// The sample budget is below the minimum the chosen estimator needs.
  #[error("{estimator} estimator needs at least {needed} samples, got {got}")]
  InsufficientSamples {
    estimator: &'static str,
    needed: usize,
    got: usize,
  },

  /// LAPACK-level failure (eigendecomposition, inversion).
  #[error(transparent)]
  Linalg(#[from] ndarray_linalg::error::LinalgError),
}

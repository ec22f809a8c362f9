//! # Running mean
//!
//! $$
//! \hat\mu_k = \frac{1}{k}\sum_{i=1}^k x_i \longrightarrow A^{-1}b
//! $$
//!

use ndarray::Array1;
use ndarray::ArrayView1;

use crate::error::EstimateError;
use crate::error::Result;
use crate::traits::OnlineEstimatorExt;

/// Arithmetic mean of the folded states. Under the drift `b − Ax` the
/// stationary mean is `A⁻¹b`, so the mean of an ergodic trajectory is the
/// Monte Carlo estimate of the linear-system solution.
pub struct MeanEstimator {
  sum: Array1<f64>,
  count: usize,
}

impl MeanEstimator {
  pub fn new(dim: usize) -> Self {
    Self {
      sum: Array1::zeros(dim),
      count: 0,
    }
  }
}

impl OnlineEstimatorExt for MeanEstimator {
  type Output = Array1<f64>;

  fn fold(&mut self, x: ArrayView1<'_, f64>) {
    self.sum += &x;
    self.count += 1;
  }

  fn count(&self) -> usize {
    self.count
  }

  fn merge(&mut self, other: Self) {
    self.sum += &other.sum;
    self.count += other.count;
  }

  fn finalize(self) -> Result<Self::Output> {
    if self.count == 0 {
      return Err(EstimateError::InsufficientSamples {
        estimator: "mean",
        needed: 1,
        got: 0,
      });
    }
    Ok(self.sum / self.count as f64)
  }
}

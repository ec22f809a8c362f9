//! # Lagged autocovariance
//!
//! $$
//! \hat C(\tau) = \frac{1}{k-\ell}\sum_{t>\ell} (x_t-\mu)(x_{t-\ell}-\mu)^\top
//! \longrightarrow e^{-A\tau}\,\Sigma
//! $$
//!

use std::collections::VecDeque;

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use super::outer;
use crate::error::EstimateError;
use crate::error::Result;
use crate::traits::OnlineEstimatorExt;

/// Running average of `(xₜ−μ)(x_{t−lag}−μ)ᵀ` over an ergodic trajectory,
/// centered at the known stationary mean `μ`. Only the last `lag` states are
/// retained, in a ring buffer; everything older is folded and dropped.
pub struct LaggedCovarianceEstimator {
  lag: usize,
  mean: Array1<f64>,
  window: VecDeque<Array1<f64>>,
  sum: Array2<f64>,
  pairs: usize,
  seen: usize,
}

impl LaggedCovarianceEstimator {
  /// `lag` is in steps and must be at least 1; `mean` is the known
  /// stationary mean the states are centered at.
  pub fn new(dim: usize, lag: usize, mean: Array1<f64>) -> Self {
    assert!(lag >= 1, "lag must be at least 1");
    assert_eq!(mean.len(), dim, "mean length must match dimension");

    Self {
      lag,
      mean,
      window: VecDeque::with_capacity(lag),
      sum: Array2::zeros((dim, dim)),
      pairs: 0,
      seen: 0,
    }
  }
}

impl OnlineEstimatorExt for LaggedCovarianceEstimator {
  type Output = Array2<f64>;

  fn fold(&mut self, x: ArrayView1<'_, f64>) {
    self.seen += 1;
    let centered = &x - &self.mean;
    if self.window.len() == self.lag {
      // The front of the window is exactly `lag` steps behind `x`.
      let past = self.window.pop_front().unwrap();
      self.sum += &outer(centered.view(), past.view());
      self.pairs += 1;
    }
    self.window.push_back(centered);
  }

  fn count(&self) -> usize {
    self.seen
  }

  /// Chains are independent, so no pairs span a chain boundary; the sums
  /// and pair counts simply add.
  fn merge(&mut self, other: Self) {
    self.sum += &other.sum;
    self.pairs += other.pairs;
    self.seen += other.seen;
  }

  fn finalize(self) -> Result<Self::Output> {
    if self.pairs == 0 {
      return Err(EstimateError::InsufficientSamples {
        estimator: "lagged covariance",
        needed: self.lag + 1,
        got: self.seen,
      });
    }
    Ok(self.sum / self.pairs as f64)
  }
}

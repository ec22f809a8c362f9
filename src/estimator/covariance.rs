//! # Single-pass covariance
//!
//! $$
//! \hat\Sigma_k = \frac{1}{k-1}\sum_{i=1}^k (x_i-\hat\mu_k)(x_i-\hat\mu_k)^\top
//! $$
//!
//! Welford's update keeps the comoment matrix exactly, so the sample
//! covariance is computed in one pass without the catastrophic cancellation
//! of the naive sum-of-squares formula.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use super::outer;
use crate::error::EstimateError;
use crate::error::Result;
use crate::traits::OnlineEstimatorExt;

/// Running mean plus comoment matrix; finalized as the unbiased sample
/// covariance, the Monte Carlo estimate of the stationary covariance `Σ`.
/// Under the `D = I` convention, `Σ = A⁻¹` for symmetric drift.
pub struct CovarianceEstimator {
  mean: Array1<f64>,
  comoment: Array2<f64>,
  count: usize,
}

impl CovarianceEstimator {
  pub fn new(dim: usize) -> Self {
    Self {
      mean: Array1::zeros(dim),
      comoment: Array2::zeros((dim, dim)),
      count: 0,
    }
  }
}

impl OnlineEstimatorExt for CovarianceEstimator {
  type Output = Array2<f64>;

  fn fold(&mut self, x: ArrayView1<'_, f64>) {
    self.count += 1;
    let delta = &x - &self.mean;
    self.mean += &(&delta / self.count as f64);
    let delta2 = &x - &self.mean;
    self.comoment += &outer(delta.view(), delta2.view());
  }

  fn count(&self) -> usize {
    self.count
  }

  /// Chan's pairwise combination of two Welford accumulators.
  fn merge(&mut self, other: Self) {
    if other.count == 0 {
      return;
    }
    if self.count == 0 {
      *self = other;
      return;
    }

    let n1 = self.count as f64;
    let n2 = other.count as f64;
    let delta = &other.mean - &self.mean;

    self.comoment += &other.comoment;
    self.comoment += &(outer(delta.view(), delta.view()) * (n1 * n2 / (n1 + n2)));
    self.mean = (&self.mean * n1 + &other.mean * n2) / (n1 + n2);
    self.count += other.count;
  }

  fn finalize(self) -> Result<Self::Output> {
    if self.count < 2 {
      return Err(EstimateError::InsufficientSamples {
        estimator: "covariance",
        needed: 2,
        got: self.count,
      });
    }
    Ok(self.comoment / (self.count - 1) as f64)
  }
}

#[cfg(test)]
mod tests {
  use ndarray::array;
  use ndarray::Array1;
  use ndarray::Array2;

  use super::CovarianceEstimator;
  use crate::error::EstimateError;
  use crate::estimator::outer;
  use crate::traits::OnlineEstimatorExt;

  fn data() -> Vec<Array1<f64>> {
    vec![
      array![1.0, 2.0],
      array![-0.5, 0.75],
      array![3.0, -1.0],
      array![0.25, 4.0],
      array![-2.0, 1.5],
    ]
  }

  fn two_pass_covariance(xs: &[Array1<f64>]) -> Array2<f64> {
    let n = xs.len() as f64;
    let mean = xs.iter().fold(Array1::<f64>::zeros(2), |acc, x| acc + x) / n;
    let mut cov = Array2::zeros((2, 2));
    for x in xs {
      let d = x - &mean;
      cov += &outer(d.view(), d.view());
    }
    cov / (n - 1.0)
  }

  #[test]
  fn welford_matches_two_pass() {
    let xs = data();
    let mut est = CovarianceEstimator::new(2);
    for x in &xs {
      est.fold(x.view());
    }

    let single = est.finalize().unwrap();
    let reference = two_pass_covariance(&xs);
    assert!((&single - &reference).iter().all(|v| v.abs() < 1e-12));
  }

  #[test]
  fn merged_chains_match_a_single_chain() {
    let xs = data();
    let mut whole = CovarianceEstimator::new(2);
    for x in &xs {
      whole.fold(x.view());
    }

    let mut left = CovarianceEstimator::new(2);
    let mut right = CovarianceEstimator::new(2);
    for x in &xs[..2] {
      left.fold(x.view());
    }
    for x in &xs[2..] {
      right.fold(x.view());
    }
    left.merge(right);

    let a = whole.finalize().unwrap();
    let b = left.finalize().unwrap();
    assert!((&a - &b).iter().all(|v| v.abs() < 1e-12));
  }

  #[test]
  fn fewer_than_two_samples_fail() {
    let mut est = CovarianceEstimator::new(2);
    est.fold(array![1.0, 1.0].view());
    assert!(matches!(
      est.finalize(),
      Err(EstimateError::InsufficientSamples { needed: 2, .. })
    ));
  }
}
